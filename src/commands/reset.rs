//! Reset command handler

use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::path::Path;

/// Delete the knowledge base, records and uploaded PDFs. Config and models stay.
pub fn run_reset(data_dir: &Path, yes: bool) -> Result<()> {
    if !data_dir.exists() {
        println!("Nothing to reset - {} does not exist.", data_dir.display());
        return Ok(());
    }

    if !yes {
        println!("\n{}\n", "⚠ RESET".red().bold());
        println!("This will permanently delete:");
        println!("  • the knowledge base and uploaded PDFs");
        println!("  • question logs, users and tokens, speech sessions");
        println!("  in {}\n", data_dir.display().to_string().yellow());

        print!("Type '{}' to confirm: ", "yes".bold());
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != "yes" {
            println!("\nAborted. No data was deleted.");
            return Ok(());
        }
    }

    std::fs::remove_dir_all(data_dir)?;
    println!("{} Deleted {}", "✓".green(), data_dir.display());
    Ok(())
}
