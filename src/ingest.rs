//! Ingestion and retrieval pipeline
//!
//! Embedding is the slow step, so it runs on a blocking thread and never
//! holds the vector store lock. Writing the finished batch is quick and is
//! the only part done under the write lock.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

use crate::chunking::{Chunk, DocMetadata, FixedChunker};
use crate::config::RetrievalConfig;
use crate::db::VectorDB;
use crate::embed::EmbeddingProvider;
use crate::types::RetrievedChunk;

/// Get optimal batch size based on device type
/// GPU can saturate with larger batches, CPU works better with smaller
fn get_embedding_batch_size(device_name: &str) -> usize {
    if device_name.contains("CPU") {
        32 // CPU: conservative to avoid memory pressure
    } else {
        64 // GPU (Metal/CUDA): better hardware utilization
    }
}

/// Chunks of one document with their embeddings, ready to write
#[derive(Debug)]
pub struct EmbeddedBatch {
    pub document_id: String,
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<Vec<f32>>,
    pub embed_secs: f64,
}

#[derive(Clone)]
pub struct IngestPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: FixedChunker,
    top_k: usize,
}

impl IngestPipeline {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, retrieval: &RetrievalConfig) -> Self {
        Self {
            embedder,
            chunker: FixedChunker::new(retrieval.chunk_size, retrieval.max_chunks),
            top_k: retrieval.top_k,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Chunk and embed a document WITHOUT needing DB access
    pub fn prepare_and_embed(&self, metadata: &DocMetadata, text: &str) -> Result<EmbeddedBatch> {
        let started = Instant::now();
        let chunks = self.chunker.chunk(text, metadata);

        let batch_size = get_embedding_batch_size(self.embedder.device_name());
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

        for (batch_idx, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).map_err(|e| {
                tracing::error!(
                    batch = batch_idx,
                    texts = texts.len(),
                    error = %e,
                    "Embedding batch failed"
                );
                e
            })?;
            embeddings.extend(vectors);
        }

        Ok(EmbeddedBatch {
            document_id: metadata.document_id.clone(),
            chunks,
            embeddings,
            embed_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// [`prepare_and_embed`](Self::prepare_and_embed) on a blocking thread
    pub async fn embed_document(&self, metadata: DocMetadata, text: String) -> Result<EmbeddedBatch> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.prepare_and_embed(&metadata, &text))
            .await
            .context("Embedding task panicked")?
    }

    /// Replace the knowledge base with the batch - call with DB write lock held
    pub async fn write_embedded_batch(&self, db: &mut VectorDB, batch: EmbeddedBatch) -> Result<u32> {
        db.replace_all(&batch.chunks, &batch.embeddings).await?;
        Ok(batch.chunks.len() as u32)
    }

    /// Embed the question and return the nearest `top_k` chunks
    pub async fn query_knowledge_base(&self, db: &VectorDB, question: &str) -> Result<Vec<RetrievedChunk>> {
        self.search(db, question, self.top_k).await
    }

    /// Nearest `limit` chunks for `query`; a limit of 0 still returns the best match
    pub async fn search(&self, db: &VectorDB, query: &str, limit: usize) -> Result<Vec<RetrievedChunk>> {
        let limit = limit.max(1);
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&query))
            .await
            .context("Embedding task panicked")??;

        let matches = db.search(&vector, limit).await?;
        Ok(matches.into_iter().map(RetrievedChunk::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting;

    impl EmbeddingProvider for Counting {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn pipeline(chunk_size: usize, max_chunks: usize) -> IngestPipeline {
        let retrieval = RetrievalConfig {
            chunk_size,
            max_chunks,
            ..RetrievalConfig::default()
        };
        IngestPipeline::new(Arc::new(Counting), &retrieval)
    }

    fn meta() -> DocMetadata {
        DocMetadata {
            document_id: "d1".to_string(),
            file_name: "report".to_string(),
        }
    }

    #[test]
    fn test_batch_size_by_device() {
        assert_eq!(get_embedding_batch_size("CPU"), 32);
        assert_eq!(get_embedding_batch_size("Metal (Apple GPU)"), 64);
    }

    #[test]
    fn test_prepare_and_embed_pairs_chunks() {
        let batch = pipeline(4, 50).prepare_and_embed(&meta(), "abcdefghij").unwrap();
        assert_eq!(batch.document_id, "d1");
        assert_eq!(batch.chunks.len(), 3);
        assert_eq!(batch.embeddings.len(), 3);
        assert_eq!(batch.embeddings[2], vec![2.0, 1.0]);
    }

    #[test]
    fn test_prepare_respects_max_chunks() {
        let text = "z".repeat(1000);
        let batch = pipeline(10, 5).prepare_and_embed(&meta(), &text).unwrap();
        assert_eq!(batch.chunks.len(), 5);
    }

    #[tokio::test]
    async fn test_embed_document_off_thread() {
        let batch = pipeline(500, 50)
            .embed_document(meta(), "short text".to_string())
            .await
            .unwrap();
        assert_eq!(batch.chunks.len(), 1);
        assert_eq!(batch.chunks[0].id, "report_page_1");
    }

    #[tokio::test]
    async fn test_zero_limit_returns_best_match() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = VectorDB::new(dir.path().to_str().unwrap(), "kb", 2).await.unwrap();
        let pipeline = pipeline(4, 50);
        let batch = pipeline.prepare_and_embed(&meta(), "abcdefghij").unwrap();
        assert_eq!(pipeline.write_embedded_batch(&mut db, batch).await.unwrap(), 3);

        let results = pipeline.search(&db, "abcd", 0).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
