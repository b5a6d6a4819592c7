//! Docs, delete, and logs command handlers
//!
//! These only touch the stores, so the embedding model is never loaded.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use docent::{records_path, Config, RecordStore, VectorDB, VECTORS_DIR};

pub fn run_docs(data_dir: &Path) -> Result<()> {
    let store = RecordStore::open(records_path(data_dir))?;
    let docs = store.list_documents()?;

    if docs.is_empty() {
        println!("No documents found. Use 'docent ingest <pdf>' to add one.");
        return Ok(());
    }

    println!("Documents:\n");
    for doc in docs {
        let status = match doc.processed_at {
            Some(_) => format!("{} chunks", doc.chunk_count).normal(),
            None => "not processed".yellow(),
        };
        println!("  {} - {} ({}, uploaded {})", doc.id.dimmed(), doc.file_name, status, doc.uploaded_at);
    }

    Ok(())
}

pub async fn run_delete(data_dir: &Path, id: &str) -> Result<()> {
    let store = RecordStore::open(records_path(data_dir))?;
    let Some(doc) = store.get_document(id)? else {
        anyhow::bail!("Document {} not found", id);
    };

    let config = Config::load_or_default()?;
    let vectors = data_dir.join(VECTORS_DIR);
    let db = VectorDB::new(
        &vectors.to_string_lossy(),
        &config.retrieval.collection,
        config.embedding_model.dimensions,
    )
    .await?;
    db.delete_document(id).await?;

    if !doc.file_path.is_empty() {
        std::fs::remove_file(&doc.file_path).ok();
    }
    store.delete_document(id)?;

    println!("{} Deleted document: {} ({})", "✓".green(), doc.file_name, doc.id);
    Ok(())
}

pub fn run_logs(data_dir: &Path, limit: usize) -> Result<()> {
    let store = RecordStore::open(records_path(data_dir))?;
    let logs = store.list_interactions(None, limit)?;

    if logs.is_empty() {
        println!("No questions asked yet.");
        return Ok(());
    }

    for log in logs {
        println!("{} {}", log.created_at.dimmed(), log.question.bold());
        println!("  {}", log.answer.replace('\n', "\n  "));
        if !log.sources.is_empty() {
            println!("  {}", log.sources.join(", ").dimmed());
        }
        println!();
    }

    Ok(())
}
