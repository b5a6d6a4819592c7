//! Docent CLI
//!
//! Ask questions about a PDF, answered from its own text.
//!
//! Commands:
//!   init    - Write the config and download the embedding model
//!   ingest  - Upload a PDF (replaces the knowledge base)
//!   ask     - Ask a question
//!   search  - Raw retrieval with scores
//!   docs    - List documents
//!   delete  - Delete a document
//!   logs    - Show past questions and answers
//!   token   - Create a user or show their API token
//!   speak   - Read a text aloud into a WAV file
//!   serve   - Start HTTP server
//!   info    - Show config, models and storage
//!   reset   - Delete all data (keeps config and models)

mod commands;
mod server;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docent::{Config, Docent};
use utils::expand_path;

#[derive(Parser)]
#[command(name = "docent")]
#[command(about = "Question answering over your PDFs")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to $DOCENT_HOME/data, i.e. ~/.docent/data)
    #[arg(short, long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the config file and download the embedding model
    Init {
        /// Embedding model id (curated) or HuggingFace repo
        #[arg(short, long)]
        model: Option<String>,

        /// Output size of a non-curated model
        #[arg(long)]
        dimensions: Option<usize>,

        /// Overwrite an existing config with defaults
        #[arg(long)]
        force: bool,
    },

    /// Upload a PDF; the knowledge base is rebuilt from it
    Ingest {
        /// Path to the PDF
        pdf: PathBuf,

        /// Display name (defaults to the file name without extension)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Ask a question about the current document
    Ask {
        question: String,
    },

    /// Show the chunks closest to a query
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// List uploaded documents
    Docs,

    /// Delete a document and its chunks
    Delete {
        /// Document ID
        id: String,
    },

    /// Show past questions and answers
    Logs {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Create a user (or show an existing one's API token)
    Token {
        username: String,

        /// Issue a new token, invalidating the old one
        #[arg(long)]
        rotate: bool,
    },

    /// Read a text aloud into a WAV file
    Speak {
        text: String,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,

        /// Prebuilt Gemini voice (defaults to tts.default_voice)
        #[arg(short, long)]
        voice: Option<String>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show config, models and storage
    Info,

    /// Delete all data (keeps config and models)
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docent=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => PathBuf::from(expand_path(&dir)),
        None => docent::config::data_dir()?,
    };

    match cli.command {
        Commands::Init { model, dimensions, force } => {
            commands::run_init_command(&data_dir, model.as_deref(), dimensions, force)?;
        }

        Commands::Ingest { pdf, name } => {
            commands::run_ingest(&data_dir, &pdf, name.as_deref()).await?;
        }

        Commands::Ask { question } => {
            commands::run_ask(&data_dir, &question).await?;
        }

        Commands::Search { query, limit } => {
            commands::run_search(&data_dir, &query, limit).await?;
        }

        Commands::Docs => {
            commands::run_docs(&data_dir)?;
        }

        Commands::Delete { id } => {
            commands::run_delete(&data_dir, &id).await?;
        }

        Commands::Logs { limit } => {
            commands::run_logs(&data_dir, limit)?;
        }

        Commands::Token { username, rotate } => {
            commands::run_token(&data_dir, &username, rotate)?;
        }

        Commands::Speak { text, out, voice } => {
            commands::run_speak(&text, &out, voice.as_deref()).await?;
        }

        Commands::Serve { port } => {
            let config = Config::load_or_default()?;
            let port = port.unwrap_or(config.server.port);
            println!("Starting server on http://localhost:{}...", port);
            let docent = Docent::open(config, &data_dir).await?;
            server::run_server(docent, port).await?;
        }

        Commands::Info => {
            commands::run_info(&data_dir)?;
        }

        Commands::Reset { yes } => {
            commands::run_reset(&data_dir, yes)?;
        }
    }

    Ok(())
}
