//! Init command handler

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use docent::{Config, Embedder, EmbeddingModelConfig};

pub fn run_init_command(
    data_dir: &Path,
    model: Option<&str>,
    dimensions: Option<usize>,
    force: bool,
) -> Result<()> {
    let mut config = match Config::load()? {
        Some(existing) if !force => {
            println!("Config already exists at {}", Config::path()?.display());
            existing
        }
        _ => Config::default(),
    };

    if let Some(id) = model {
        let selected = match (EmbeddingModelConfig::find_curated(id), dimensions) {
            (Some(curated), _) => curated,
            // Any BERT sentence-transformer on the Hub, given its output size
            (None, Some(dims)) if id.contains('/') => EmbeddingModelConfig::custom(id, dims),
            (None, _) => {
                let ids: Vec<String> = EmbeddingModelConfig::curated_models()
                    .into_iter()
                    .map(|m| m.id)
                    .collect();
                anyhow::bail!(
                    "Unknown embedding model '{}'. Choose one of: {} (or pass a HuggingFace repo with --dimensions)",
                    id,
                    ids.join(", ")
                );
            }
        };
        if selected != config.embedding_model {
            println!(
                "{} Changing the embedding model; run 'docent reset' and re-ingest your document.",
                "!".yellow()
            );
        }
        config.embedding_model = selected;
    }

    config.save()?;
    std::fs::create_dir_all(data_dir)?;
    println!("{} Configuration saved to {}", "✓".green(), Config::path()?.display());

    // Fetch the model now so the first upload doesn't wait on the download
    println!("\nDownloading {} ({}MB)...", config.embedding_model.name, config.embedding_model.size_mb);
    let embedder = Embedder::new_with_model(&config.embedding_model, &config.device, true)?;
    drop(embedder);

    println!("\n{} Setup complete!", "✓".green());
    if config.llm.api_key().is_err() {
        println!(
            "\nSet {} (or add it to .env) to enable answers and speech.",
            config.llm.api_key_env.bold()
        );
    }

    Ok(())
}
