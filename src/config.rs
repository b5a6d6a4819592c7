//! Configuration management for Docent
//!
//! Handles model selection, retrieval parameters, and server limits.
//! Persisted as TOML in `$DOCENT_HOME/config.toml` (defaults to `~/.docent`).
//! Secrets are never stored here: the Gemini key is read from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that relocates the Docent home directory
pub const HOME_ENV: &str = "DOCENT_HOME";

/// Where the embedding model runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// First GPU compiled in and present, else CPU
    #[default]
    Auto,
    Cpu,
    Metal,
    Cuda,
}

impl DevicePreference {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Metal => "metal",
            Self::Cuda => "cuda",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding model
// ─────────────────────────────────────────────────────────────────────────────

/// (id, HuggingFace repo, dimensions, approximate download MB)
const CURATED_MODELS: &[(&str, &str, usize, u32)] = &[
    ("all-MiniLM-L6-v2", "sentence-transformers/all-MiniLM-L6-v2", 384, 86),
    ("all-MiniLM-L12-v2", "sentence-transformers/all-MiniLM-L12-v2", 384, 134),
    ("bge-small-en-v1.5", "BAAI/bge-small-en-v1.5", 384, 134),
];

/// BERT sentence-embedding model used for chunks and questions.
///
/// The table is created with `dimensions`, so switching models needs a
/// reset and a fresh upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingModelConfig {
    /// Key in `config.toml`; `custom:<repo>` for non-curated models
    pub id: String,
    pub name: String,
    pub repo_id: String,
    pub dimensions: usize,
    #[serde(default)]
    pub size_mb: u32,
    #[serde(default)]
    pub curated: bool,
}

impl EmbeddingModelConfig {
    fn from_entry(&(id, repo_id, dimensions, size_mb): &(&str, &str, usize, u32)) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            repo_id: repo_id.to_string(),
            dimensions,
            size_mb,
            curated: true,
        }
    }

    /// Any BERT sentence-transformer on the Hub, given its output size
    pub fn custom(repo_id: &str, dimensions: usize) -> Self {
        let name = repo_id.rsplit('/').next().unwrap_or(repo_id);
        Self {
            id: format!("custom:{}", repo_id),
            name: name.to_string(),
            repo_id: repo_id.to_string(),
            dimensions,
            size_mb: 0,
            curated: false,
        }
    }

    pub fn curated_models() -> Vec<Self> {
        CURATED_MODELS.iter().map(Self::from_entry).collect()
    }

    pub fn find_curated(id: &str) -> Option<Self> {
        CURATED_MODELS
            .iter()
            .find(|(model_id, ..)| *model_id == id)
            .map(Self::from_entry)
    }
}

impl Default for EmbeddingModelConfig {
    fn default() -> Self {
        Self::from_entry(&CURATED_MODELS[0])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline, LLM, speech and server sections
// ─────────────────────────────────────────────────────────────────────────────

/// Chunking and nearest-neighbour parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunk width in characters
    pub chunk_size: usize,
    /// Chunks kept per document; the rest of the text is dropped
    pub max_chunks: usize,
    /// Chunks returned per question
    pub top_k: usize,
    /// LanceDB table holding the knowledge base
    pub collection: String,
    /// Processing slower than this is logged as a warning
    pub slow_processing_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            max_chunks: 50,
            top_k: 3,
            collection: "knowledge_base".to_string(),
            slow_processing_secs: 30,
        }
    }
}

/// Upload validation limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Gemini text generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => anyhow::bail!("{} is not set", self.api_key_env),
        }
    }
}

/// Gemini speech synthesis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub model: String,
    pub default_voice: String,
    /// Characters synthesized per segment; smaller segments pause sooner
    pub segment_chars: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-preview-tts".to_string(),
            default_voice: "Kore".to_string(),
            segment_chars: 400,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Require `Authorization: Token <key>` on API routes
    pub require_auth: bool,
    /// Per user, or per client address when authentication is off; 0 disables
    pub upload_per_minute: u32,
    pub ask_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            require_auth: true,
            upload_per_minute: 5,
            ask_per_minute: 10,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Docent configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Selected embedding model
    #[serde(default)]
    pub embedding_model: EmbeddingModelConfig,
    /// Device preference (auto, cpu, metal, cuda)
    #[serde(default)]
    pub device: DevicePreference,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Get the config file path ($DOCENT_HOME/config.toml)
    pub fn path() -> Result<PathBuf> {
        Ok(base_dir()?.join("config.toml"))
    }

    /// Load config from disk, or return None if it doesn't exist
    pub fn load() -> Result<Option<Self>> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(Some(config))
    }

    /// Load config from disk, falling back to defaults on first run
    pub fn load_or_default() -> Result<Self> {
        Ok(Self::load()?.unwrap_or_default())
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(&path, content)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the base docent directory path (~/.docent unless DOCENT_HOME is set)
pub fn base_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".docent"))
}

/// Get the data directory path ($DOCENT_HOME/data)
pub fn data_dir() -> Result<PathBuf> {
    Ok(base_dir()?.join("data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.embedding_model.id, "all-MiniLM-L6-v2");
        assert_eq!(config.embedding_model.dimensions, 384);
        assert_eq!(config.retrieval.chunk_size, 500);
        assert_eq!(config.retrieval.max_chunks, 50);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.collection, "knowledge_base");
        assert_eq!(config.upload.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.server.upload_per_minute, 5);
        assert_eq!(config.server.ask_per_minute, 10);
    }

    #[test]
    fn test_find_curated() {
        let model = EmbeddingModelConfig::find_curated("bge-small-en-v1.5").unwrap();
        assert_eq!(model.repo_id, "BAAI/bge-small-en-v1.5");
        assert!(model.curated);
        assert_eq!(EmbeddingModelConfig::curated_models().len(), 3);
        assert!(EmbeddingModelConfig::find_curated("nonexistent").is_none());
    }

    #[test]
    fn test_custom_model() {
        let model = EmbeddingModelConfig::custom("sentence-transformers/all-mpnet-base-v2", 768);
        assert_eq!(model.name, "all-mpnet-base-v2");
        assert_eq!(model.dimensions, 768);
        assert!(!model.curated);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.embedding_model.id, parsed.embedding_model.id);
        assert_eq!(config.retrieval, parsed.retrieval);
        assert_eq!(config.server, parsed.server);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            device = "cpu"

            [retrieval]
            top_k = 5

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(parsed.device, DevicePreference::Cpu);
        assert_eq!(parsed.retrieval.top_k, 5);
        assert_eq!(parsed.retrieval.chunk_size, 500);
        assert_eq!(parsed.server.port, 9000);
        assert!(parsed.server.require_auth);
        assert_eq!(parsed.llm.model, "gemini-1.5-flash");
    }

    #[test]
    fn test_api_key_missing_is_error() {
        let llm = LlmConfig {
            api_key_env: "DOCENT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        let err = llm.api_key().unwrap_err();
        assert!(err.to_string().contains("DOCENT_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
