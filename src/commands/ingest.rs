//! Ingest command handler

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use docent::{DocentError, UploadRequest};

use super::{open_docent, spinner};

pub async fn run_ingest(data_dir: &Path, pdf: &Path, name: Option<&str>) -> Result<()> {
    let bytes = std::fs::read(pdf).with_context(|| format!("Failed to read {}", pdf.display()))?;
    let original_name = pdf
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = match name {
        Some(name) => name.to_string(),
        None => pdf
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| original_name.clone()),
    };

    let docent = open_docent(data_dir).await?;

    let pb = spinner(&format!("Processing {}...", original_name))?;
    let result = docent
        .upload_document(UploadRequest {
            file_name,
            original_name,
            bytes,
        })
        .await;
    pb.finish_and_clear();

    match result {
        Ok(response) => {
            println!("{} {}", "✓".green(), response.message);
            println!("  Document: {} ({})", response.file_name, response.document_id);
            println!("  Chunks:   {}", response.chunks);
            println!("\nThe knowledge base now holds this document only.");
            Ok(())
        }
        Err(DocentError::Validation(errors)) => {
            for (field, messages) in &errors.0 {
                println!("{} {}: {}", "✗".red(), field, messages.join(" "));
            }
            anyhow::bail!("Upload rejected")
        }
        Err(e) => Err(e.into()),
    }
}
