//! Local embeddings using Candle (pure Rust)
//!
//! Runs a BERT sentence-transformer (all-MiniLM-L6-v2 by default) configured via
//! `$DOCENT_HOME/config.toml`. Weights come from the HuggingFace hub cache.
//!
//! GPU acceleration is available via feature flags:
//! - `metal` - Apple Silicon GPU (macOS)
//! - `cuda` - NVIDIA GPU

use crate::config::{Config, DevicePreference, EmbeddingModelConfig};
use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use tokenizers::Tokenizer;

/// Anything that turns text into fixed-size vectors.
///
/// The pipeline and the query path only talk to this trait, so the model can be
/// swapped (or faked in tests) without touching the vector store.
pub trait EmbeddingProvider: Send + Sync {
    /// Create embeddings for multiple texts
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embedding dimension
    fn dimension(&self) -> usize;

    /// Human-readable device the model runs on
    fn device_name(&self) -> &'static str {
        "CPU"
    }

    /// Create embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .context("Embedding model returned no vector")
    }
}

/// BERT position embeddings stop at 512
const MAX_SEQ_LEN: usize = 512;

/// Pick the device for a preference; `Auto` tries each compiled-in GPU, then CPU
pub fn resolve_device(preference: &DevicePreference) -> Result<Device> {
    match preference {
        DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Metal if cfg!(feature = "metal") => {
            Device::new_metal(0).context("Failed to initialize Metal device")
        }
        DevicePreference::Cuda if cfg!(feature = "cuda") => {
            Device::new_cuda(0).context("Failed to initialize CUDA device")
        }
        DevicePreference::Metal | DevicePreference::Cuda => anyhow::bail!(
            "{} support is not compiled in; rebuild with --features {}",
            preference.name(),
            preference.name()
        ),
        DevicePreference::Auto => {
            if cfg!(feature = "metal") {
                if let Ok(device) = Device::new_metal(0) {
                    return Ok(device);
                }
            }
            if cfg!(feature = "cuda") {
                if let Ok(device) = Device::new_cuda(0) {
                    return Ok(device);
                }
            }
            Ok(Device::Cpu)
        }
    }
}

pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA (NVIDIA GPU)",
        Device::Metal(_) => "Metal (Apple GPU)",
    }
}

/// Sentence embedder: BERT forward pass, masked mean pooling, L2 norm
pub struct Embedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimensions: usize,
}

impl Embedder {
    pub fn new(config: &Config) -> Result<Self> {
        Self::new_with_model(&config.embedding_model, &config.device, false)
    }

    /// Load (downloading on first use) the model's config, tokenizer and weights
    pub fn new_with_model(
        embedding_model: &EmbeddingModelConfig,
        device_pref: &DevicePreference,
        show_progress: bool,
    ) -> Result<Self> {
        let device = resolve_device(device_pref)?;
        tracing::info!(
            model = %embedding_model.name,
            repo = %embedding_model.repo_id,
            device = device_name(&device),
            "Loading embedding model"
        );

        let repo = ApiBuilder::new()
            .with_progress(show_progress)
            .build()
            .context("Failed to create HuggingFace API")?
            .repo(Repo::new(embedding_model.repo_id.clone(), RepoType::Model));
        let fetch = |file: &str| {
            repo.get(file)
                .with_context(|| format!("Failed to fetch {} from {}", file, embedding_model.repo_id))
        };

        let bert_config: BertConfig = serde_json::from_str(&std::fs::read_to_string(fetch("config.json")?)?)
            .context("Invalid model config.json")?;
        let tokenizer = Tokenizer::from_file(fetch("tokenizer.json")?)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        // SAFETY: the safetensors file lives in the HF cache and is not mutated while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[fetch("model.safetensors")?], DTYPE, &device)? };
        let model = BertModel::load(vb, &bert_config)?;

        Ok(Self {
            model,
            tokenizer,
            device,
            dimensions: embedding_model.dimensions,
        })
    }

    /// Token ids and attention mask, truncated and right-padded to the longest text
    fn encode(&self, texts: &[String]) -> Result<(Tensor, Tensor)> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let width = encodings
            .iter()
            .map(|e| e.get_ids().len().min(MAX_SEQ_LEN))
            .max()
            .unwrap_or(0);
        let padded = |values: &[u32]| {
            let mut row: Vec<u32> = values.iter().take(MAX_SEQ_LEN).copied().collect();
            row.resize(width, 0);
            row
        };

        let ids: Vec<u32> = encodings.iter().flat_map(|e| padded(e.get_ids())).collect();
        let mask: Vec<u32> = encodings.iter().flat_map(|e| padded(e.get_attention_mask())).collect();

        let shape = (texts.len(), width);
        Ok((
            Tensor::from_vec(ids, shape, &self.device)?,
            Tensor::from_vec(mask, shape, &self.device)?,
        ))
    }
}

/// Average the token vectors the mask keeps, then scale each row to unit length
fn mean_pool_normalized(hidden: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let mask = mask.to_dtype(DTYPE)?;
    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    // recip + mul rather than broadcast_div, which misbehaves on Metal
    let mean = summed.broadcast_mul(&mask.sum_keepdim(1)?.recip()?)?;
    let norms = mean.sqr()?.sum_keepdim(1)?.sqrt()?;
    Ok(mean.broadcast_mul(&norms.recip()?)?)
}

impl EmbeddingProvider for Embedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let (input_ids, attention_mask) = self.encode(texts)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        Ok(mean_pool_normalized(&hidden, &attention_mask)?.to_vec2()?)
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn device_name(&self) -> &'static str {
        device_name(&self.device)
    }
}

/// GPU backends this binary was built with
#[derive(Debug, Clone, Copy)]
pub struct GpuSupportInfo {
    pub metal_compiled: bool,
    pub cuda_compiled: bool,
}

pub fn gpu_support_info() -> GpuSupportInfo {
    GpuSupportInfo {
        metal_compiled: cfg!(feature = "metal"),
        cuda_compiled: cfg!(feature = "cuda"),
    }
}

impl GpuSupportInfo {
    pub fn any_gpu(&self) -> bool {
        self.metal_compiled || self.cuda_compiled
    }

    pub fn summary(&self) -> String {
        let backends: Vec<&str> = [(self.metal_compiled, "Metal"), (self.cuda_compiled, "CUDA")]
            .into_iter()
            .filter_map(|(on, name)| on.then_some(name))
            .collect();
        if backends.is_empty() {
            "None (CPU only)".to_string()
        } else {
            backends.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(Vec<f32>);

    impl EmbeddingProvider for Constant {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }
    }

    struct Empty;

    impl EmbeddingProvider for Empty {
        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(Vec::new())
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    #[test]
    fn test_embed_uses_first_vector() {
        let provider = Constant(vec![0.6, 0.8]);
        assert_eq!(provider.embed("hello").unwrap(), vec![0.6, 0.8]);
        assert_eq!(provider.device_name(), "CPU");
    }

    #[test]
    fn test_embed_errors_when_model_returns_nothing() {
        let err = Empty.embed("hello").unwrap_err();
        assert!(err.to_string().contains("no vector"));
    }

    #[test]
    fn test_gpu_summary_cpu_only() {
        let info = GpuSupportInfo { metal_compiled: false, cuda_compiled: false };
        assert!(!info.any_gpu());
        assert_eq!(info.summary(), "None (CPU only)");

        let info = GpuSupportInfo { metal_compiled: true, cuda_compiled: true };
        assert_eq!(info.summary(), "Metal, CUDA");
    }
}
