//! Ask command handler

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use docent::User;

use super::{open_docent, spinner};

pub async fn run_ask(data_dir: &Path, question: &str) -> Result<()> {
    let docent = open_docent(data_dir).await?;

    let pb = spinner("Thinking...")?;
    let result = docent.ask(&User::anonymous(), question).await;
    pb.finish_and_clear();
    let response = result?;

    println!("{}\n", response.answer);
    if !response.sources.is_empty() {
        println!("{}", "Sources:".bold());
        for source in &response.sources {
            println!("  • {}", source.dimmed());
        }
    }

    Ok(())
}
