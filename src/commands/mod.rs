//! CLI command handlers

pub mod ask;
pub mod docs;
pub mod info;
pub mod ingest;
pub mod init;
pub mod reset;
pub mod search;
pub mod speak;
pub mod token;

pub use ask::run_ask;
pub use docs::{run_delete, run_docs, run_logs};
pub use info::run_info;
pub use ingest::run_ingest;
pub use init::run_init_command;
pub use reset::run_reset;
pub use search::run_search;
pub use speak::run_speak;
pub use token::run_token;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use docent::{Config, Docent};

/// Spinner for a long-running step; call `finish_and_clear` when done
pub(crate) fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Load config and open the full instance (embedding model included)
pub(crate) async fn open_docent(data_dir: &Path) -> Result<Docent> {
    let config = Config::load_or_default()?;
    let pb = spinner(&format!("Loading {}...", config.embedding_model.name))?;
    let docent = Docent::open(config, data_dir).await;
    pb.finish_and_clear();
    docent
}
