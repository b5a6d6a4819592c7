//! Search command handler

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use super::open_docent;

pub async fn run_search(data_dir: &Path, query: &str, limit: usize) -> Result<()> {
    let docent = open_docent(data_dir).await?;

    println!("Searching for: {}\n", query);
    let results = docent.search(query, limit).await?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [Score: {:.3}] {}", i + 1, result.score, result.source_label().cyan());

        // Show first 200 chars of content
        let preview: String = result.text.chars().take(200).collect();
        println!("   {}...\n", preview.replace('\n', " "));
    }

    Ok(())
}
