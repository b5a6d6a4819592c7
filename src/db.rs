//! LanceDB vector database for storing and searching chunk embeddings
//!
//! The knowledge base is a single table (the collection). Every upload
//! rebuilds it: existing rows are deleted and the new document's chunks are
//! inserted. Chunk text is stored alongside the vector so a search needs no
//! second lookup.

use crate::chunking::Chunk;
use crate::types::ChunkMatch;
use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::sync::Arc;

/// Escape single quotes in strings to prevent SQL injection
pub fn escape_sql(s: &str) -> String {
    s.replace('\'', "''")
}

pub struct VectorDB {
    conn: Connection,
    collection: String,
    table: Option<Table>,
    embedding_dim: usize,
}

impl VectorDB {
    /// Open (or lazily create) the collection under `data_dir`
    pub async fn new(data_dir: &str, collection: &str, embedding_dim: usize) -> Result<Self> {
        let conn = connect(data_dir)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let table = conn.open_table(collection).execute().await.ok();

        Ok(Self {
            conn,
            collection: collection.to_string(),
            table,
            embedding_dim,
        })
    }

    /// Get or create the collection table
    async fn get_or_create_table(&mut self) -> Result<Table> {
        if let Some(ref table) = self.table {
            return Ok(table.clone());
        }

        let schema = self.schema();
        let table = self
            .conn
            .create_empty_table(&self.collection, schema)
            .execute()
            .await
            .context("Failed to create knowledge base table")?;

        self.table = Some(table.clone());
        Ok(table)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("file_name", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("page", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.embedding_dim as i32,
                ),
                false,
            ),
        ]))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Collection Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of chunks currently in the knowledge base
    pub async fn count(&self) -> Result<usize> {
        match &self.table {
            Some(table) => table
                .count_rows(None)
                .await
                .context("Failed to count chunks"),
            None => Ok(0),
        }
    }

    /// Delete every chunk, keeping the table
    pub async fn clear(&self) -> Result<usize> {
        let existing = self.count().await?;
        if existing > 0 {
            if let Some(ref table) = self.table {
                table
                    .delete("id IS NOT NULL")
                    .await
                    .context("Failed to clear knowledge base")?;
            }
        }
        Ok(existing)
    }

    /// Insert chunks with their embeddings
    pub async fn insert_chunks(&mut self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        if chunks.len() != embeddings.len() {
            anyhow::bail!(
                "Got {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.embedding_dim) {
            anyhow::bail!(
                "Embedding has {} dimensions, knowledge base expects {}",
                bad.len(),
                self.embedding_dim
            );
        }

        let table = self.get_or_create_table().await?;

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let document_ids: Vec<&str> = chunks.iter().map(|c| c.metadata.document_id.as_str()).collect();
        let file_names: Vec<&str> = chunks.iter().map(|c| c.metadata.file_name.as_str()).collect();
        let chunk_indexes: Vec<u32> = chunks.iter().map(|c| c.metadata.chunk_index).collect();
        let pages: Vec<u32> = chunks.iter().map(|c| c.metadata.page).collect();
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let content_hashes: Vec<&str> = chunks.iter().map(|c| c.metadata.content_hash.as_str()).collect();

        let flat_embeddings: Vec<f32> = embeddings.iter().flatten().copied().collect();

        let schema = self.schema();

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(document_ids)),
                Arc::new(StringArray::from(file_names)),
                Arc::new(UInt32Array::from(chunk_indexes)),
                Arc::new(UInt32Array::from(pages)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(content_hashes)),
                Arc::new(FixedSizeListArray::new(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.embedding_dim as i32,
                    Arc::new(Float32Array::from(flat_embeddings)),
                    None,
                )),
            ],
        )?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(batches)
            .execute()
            .await
            .context("Failed to add chunks")?;

        Ok(())
    }

    /// Width of the stored `vector` column, if the table exists
    async fn stored_dim(&self) -> Result<Option<usize>> {
        let Some(ref table) = self.table else {
            return Ok(None);
        };
        let schema = table
            .schema()
            .await
            .context("Failed to read knowledge base schema")?;
        Ok(schema
            .field_with_name("vector")
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, width) => usize::try_from(*width).ok(),
                _ => None,
            }))
    }

    /// Rebuild the knowledge base from a single document.
    ///
    /// A table written by a model of another width is dropped and recreated.
    pub async fn replace_all(&mut self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if let Some(stored) = self.stored_dim().await? {
            if stored != self.embedding_dim {
                tracing::warn!(
                    stored,
                    expected = self.embedding_dim,
                    "Embedding width changed; recreating knowledge base table"
                );
                self.conn
                    .drop_table(&self.collection)
                    .await
                    .context("Failed to drop knowledge base table")?;
                self.table = None;
            }
        }

        let removed = self.clear().await?;
        if removed > 0 {
            tracing::info!(removed, "Cleared existing knowledge base entries");
        }
        self.insert_chunks(chunks, embeddings).await
    }

    /// Nearest chunks by cosine distance, closest first
    pub async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ChunkMatch>> {
        let limit = limit.max(1);
        let table = self
            .table
            .as_ref()
            .context("The knowledge base is empty. Upload a document first")?;

        let results = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute search")?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .context("Failed to collect results")?;

        let mut matches = Vec::new();

        for batch in batches {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let document_ids = batch
                .column_by_name("document_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let file_names = batch
                .column_by_name("file_name")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let chunk_indexes = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
            let pages = batch
                .column_by_name("page")
                .and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
            let contents = batch
                .column_by_name("content")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            if let (
                Some(ids),
                Some(document_ids),
                Some(file_names),
                Some(chunk_indexes),
                Some(pages),
                Some(contents),
                Some(distances),
            ) = (ids, document_ids, file_names, chunk_indexes, pages, contents, distances)
            {
                for i in 0..batch.num_rows() {
                    let distance = if distances.is_null(i) { 1.0 } else { distances.value(i) };
                    matches.push(ChunkMatch {
                        id: ids.value(i).to_string(),
                        document_id: document_ids.value(i).to_string(),
                        file_name: file_names.value(i).to_string(),
                        chunk_index: chunk_indexes.value(i),
                        page: pages.value(i),
                        content: contents.value(i).to_string(),
                        score: 1.0 - distance,
                    });
                }
            }
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);

        Ok(matches)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Deletion Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Delete the chunks of one document
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        if let Some(ref table) = self.table {
            table
                .delete(&format!("document_id = '{}'", escape_sql(document_id)))
                .await
                .context("Failed to delete document chunks")?;
        }
        Ok(())
    }

    /// Reset everything - drop the collection
    pub async fn reset_all(&mut self) -> Result<()> {
        if self.table.is_some() {
            self.conn.drop_table(&self.collection).await.ok();
            self.table = None;
        }
        Ok(())
    }
}
