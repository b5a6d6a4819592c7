//! Token command handler

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use docent::{records_path, RecordStore};

/// Create the user if needed and print their API token
pub fn run_token(data_dir: &Path, username: &str, rotate: bool) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        anyhow::bail!("Username may not be blank");
    }

    std::fs::create_dir_all(data_dir)?;
    let store = RecordStore::open(records_path(data_dir))?;

    let existing = store.user_by_name(username)?.is_some();
    let mut user = store.create_user(username)?;
    if rotate && existing {
        if let Some(rotated) = store.rotate_token(username)? {
            user = rotated;
        }
    }

    let label = match (existing, rotate) {
        (false, _) => "Created user",
        (true, true) => "Rotated token for",
        (true, false) => "Token for",
    };
    println!("{} {}", label, user.username.bold());
    println!("\n  {}\n", user.token.green());
    println!("Send it as: Authorization: Token {}", user.token);

    Ok(())
}
