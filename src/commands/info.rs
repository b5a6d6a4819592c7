//! Info command handler

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use docent::{gpu_support_info, records_path, Config, RecordStore};

use crate::utils::{data_size, format_bytes, scan_hf_cache};

pub fn run_info(data_dir: &Path) -> Result<()> {
    println!("{}\n", "Docent - PDF question answering".bold());

    let config = match Config::load()? {
        Some(config) => config,
        None => {
            println!("Not initialized. Run 'docent init' to write a config (defaults are used until then).\n");
            Config::default()
        }
    };

    println!(
        "Embedding: {} ({}MB, {} dims)",
        config.embedding_model.name,
        config.embedding_model.size_mb,
        config.embedding_model.dimensions
    );
    println!("Device:    {}", config.device.name());
    println!("LLM:       {}", config.llm.model);
    println!("TTS:       {} (voice {})", config.tts.model, config.tts.default_voice);
    let key_status = match config.llm.api_key() {
        Ok(_) => "set".green(),
        Err(_) => "missing".red(),
    };
    println!("API key:   {} ({})", config.llm.api_key_env, key_status);
    println!(
        "Retrieval: {} chars x {} chunks max, top {}",
        config.retrieval.chunk_size,
        config.retrieval.max_chunks,
        config.retrieval.top_k
    );

    // Show GPU support info
    let gpu_info = gpu_support_info();
    println!("\nGPU Support: {}", gpu_info.summary());
    if !gpu_info.any_gpu() {
        println!("  Rebuild with --features metal (macOS) or --features cuda (NVIDIA)");
    }

    println!("\nData directory: {}", data_dir.display());
    if records_path(data_dir).exists() {
        let store = RecordStore::open(records_path(data_dir))?;
        println!("  Documents:    {}", store.count_documents()?);
        println!("  Users:        {}", store.list_users()?.len());
    }

    let size = data_size(data_dir);
    println!("\n{}", "Storage".bold());
    println!("  Vector DB (LanceDB)    {:>12}", format_bytes(size.vectors));
    println!("  Records (SQLite)       {:>12}", format_bytes(size.records));
    println!("  Uploaded PDFs          {:>12}", format_bytes(size.documents));
    println!("  Subtotal               {:>12}", format_bytes(size.total()));

    let cached_models = scan_hf_cache();
    println!("\n{} (cached from HuggingFace)", "Models".bold());
    if cached_models.is_empty() {
        println!("  No models downloaded yet");
    } else {
        for model in &cached_models {
            println!("  {:<24} {:>12}", model.name, format_bytes(model.size_bytes));
        }
    }

    Ok(())
}
