//! Docent - question answering over uploaded PDFs
//!
//! Storage layout under the data directory:
//! - `vectors/`: LanceDB knowledge base (chunk text + embeddings)
//! - `records.db`: SQLite documents, interaction log, users, speech sessions
//! - `documents/`: the uploaded PDFs

pub mod chunking;
pub mod config;
pub mod db;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod store;
pub mod tts;
pub mod types;

pub use config::{Config, DevicePreference, EmbeddingModelConfig};
pub use db::VectorDB;
pub use embed::{gpu_support_info, Embedder, EmbeddingProvider, GpuSupportInfo};
pub use error::DocentError;
pub use ingest::{EmbeddedBatch, IngestPipeline};
pub use llm::{AnswerGenerator, GeminiClient, Unavailable};
pub use store::RecordStore;
pub use tts::{GeminiSpeech, SpeechAudio, SpeechSynthesizer};
pub use types::*;

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::RwLock;

use chunking::DocMetadata;

pub const VECTORS_DIR: &str = "vectors";
pub const RECORDS_FILE: &str = "records.db";
pub const DOCUMENTS_DIR: &str = "documents";

/// Path of the SQLite record store inside `data_dir`
pub fn records_path(data_dir: &Path) -> PathBuf {
    data_dir.join(RECORDS_FILE)
}

type DocentResult<T> = Result<T, DocentError>;

/// Docent knowledge base instance
pub struct Docent {
    config: Config,
    data_dir: PathBuf,
    pipeline: IngestPipeline,
    db: RwLock<VectorDB>,
    records: Mutex<RecordStore>,
    generator: Arc<dyn AnswerGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
}

impl Docent {
    /// Production wiring: local embedding model plus Gemini for answers and speech
    pub async fn open(config: Config, data_dir: &Path) -> anyhow::Result<Self> {
        let model = config.embedding_model.clone();
        let device = config.device.clone();
        let embedder = tokio::task::spawn_blocking(move || Embedder::new_with_model(&model, &device, false))
            .await
            .context("Embedding model loader panicked")??;

        let generator: Arc<dyn AnswerGenerator>;
        let speech: Arc<dyn SpeechSynthesizer>;
        match GeminiClient::from_config(&config.llm) {
            Ok(client) => {
                generator = Arc::new(client);
                speech = Arc::new(GeminiSpeech::from_config(&config.llm, &config.tts)?);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Gemini is not configured; ask and speech will fail");
                let reason = format!("{:#}", e);
                generator = Arc::new(Unavailable::new(reason.clone()));
                speech = Arc::new(Unavailable::new(reason));
            }
        }

        Self::with_components(config, data_dir, Arc::new(embedder), generator, speech).await
    }

    /// Wire up with explicit providers
    pub async fn with_components(
        config: Config,
        data_dir: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let vectors = data_dir.join(VECTORS_DIR);
        let vectors = vectors.to_str().context("Data directory is not valid UTF-8")?;
        let db = VectorDB::new(vectors, &config.retrieval.collection, embedder.dimension()).await?;
        let records = RecordStore::open(records_path(data_dir))?;
        let pipeline = IngestPipeline::new(embedder, &config.retrieval);

        tracing::info!(
            data_dir = %data_dir.display(),
            generator = generator.name(),
            speech = speech.name(),
            "Docent ready"
        );

        Ok(Self {
            config,
            data_dir: data_dir.to_path_buf(),
            pipeline,
            db: RwLock::new(db),
            records: Mutex::new(records),
            generator,
            speech,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn device_name(&self) -> &'static str {
        self.pipeline.embedder().device_name()
    }

    fn records(&self) -> anyhow::Result<MutexGuard<'_, RecordStore>> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("Record store lock poisoned"))
    }

    fn documents_dir(&self) -> PathBuf {
        self.data_dir.join(DOCUMENTS_DIR)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Upload and processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate, store and process an uploaded PDF.
    ///
    /// The knowledge base is rebuilt from this document alone. If processing
    /// fails the record and the stored file are removed again.
    pub async fn upload_document(&self, request: UploadRequest) -> DocentResult<UploadResponse> {
        request.validate(self.config.upload.max_file_bytes)?;

        let id = uuid::Uuid::new_v4().to_string();
        let docs_dir = self.documents_dir();
        std::fs::create_dir_all(&docs_dir).context("Failed to create documents directory")?;
        let file_path = docs_dir.join(format!("{}.pdf", id));
        std::fs::write(&file_path, &request.bytes).context("Failed to store uploaded file")?;

        let record = DocumentRecord {
            id: id.clone(),
            file_name: request.file_name.clone(),
            file_path: file_path.to_string_lossy().to_string(),
            uploaded_at: chrono::Utc::now().to_rfc3339(),
            chunk_count: 0,
            processed_at: None,
        };
        if let Err(e) = self.records().and_then(|r| r.insert_document(&record)) {
            let _ = std::fs::remove_file(&file_path);
            return Err(e.into());
        }

        match self.process_document(&id).await {
            Ok(chunks) => Ok(UploadResponse {
                message: "Document uploaded and processed successfully".to_string(),
                file_name: record.file_name,
                document_id: id,
                chunks,
            }),
            Err(e) => {
                tracing::error!(document_id = %id, error = %format!("{:#}", e), "Document processing failed");
                if let Err(cleanup) = self.records().and_then(|r| r.delete_document(&id)) {
                    tracing::warn!(error = %cleanup, "Failed to remove document record");
                }
                let _ = std::fs::remove_file(&file_path);
                Err(DocentError::processing(e))
            }
        }
    }

    /// Extract, chunk, embed and store a document that is already on record
    pub async fn process_document(&self, document_id: &str) -> anyhow::Result<u32> {
        let started = Instant::now();
        tracing::info!(document_id, "Starting document processing");

        let record = self
            .records()?
            .get_document(document_id)?
            .with_context(|| format!("Document {} not found", document_id))?;

        let parse_started = Instant::now();
        let path = PathBuf::from(&record.file_path);
        let text = tokio::task::spawn_blocking(move || chunking::extract_text_from_pdf(&path))
            .await
            .context("PDF extraction panicked")??;
        tracing::info!(
            secs = %format!("{:.2}", parse_started.elapsed().as_secs_f64()),
            "PDF parsing completed"
        );

        self.index_text(&record, text, started).await
    }

    /// Index text that was extracted elsewhere, as if it were an upload
    pub async fn ingest_text(&self, file_name: &str, text: &str) -> DocentResult<UploadResponse> {
        let mut errors = ValidationError::new();
        if file_name.trim().is_empty() {
            errors.add("file_name", "This field may not be blank.");
        }
        if text.trim().is_empty() {
            errors.add("text", "This field may not be blank.");
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let record = DocumentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            file_path: String::new(),
            uploaded_at: chrono::Utc::now().to_rfc3339(),
            chunk_count: 0,
            processed_at: None,
        };
        self.records()?.insert_document(&record)?;

        match self.index_text(&record, text.to_string(), Instant::now()).await {
            Ok(chunks) => Ok(UploadResponse {
                message: "Document uploaded and processed successfully".to_string(),
                file_name: record.file_name,
                document_id: record.id,
                chunks,
            }),
            Err(e) => {
                if let Err(cleanup) = self.records().and_then(|r| r.delete_document(&record.id)) {
                    tracing::warn!(error = %cleanup, "Failed to remove document record");
                }
                Err(DocentError::processing(e))
            }
        }
    }

    async fn index_text(&self, record: &DocumentRecord, text: String, started: Instant) -> anyhow::Result<u32> {
        let metadata = DocMetadata {
            document_id: record.id.clone(),
            file_name: record.file_name.clone(),
        };

        let batch = self.pipeline.embed_document(metadata, text).await?;
        if batch.chunks.is_empty() {
            anyhow::bail!("No text could be extracted from {}", record.file_name);
        }
        tracing::info!(
            chunks = batch.chunks.len(),
            secs = %format!("{:.2}", batch.embed_secs),
            "Embedding generation completed"
        );

        let store_started = Instant::now();
        let chunks = {
            let mut db = self.db.write().await;
            self.pipeline.write_embedded_batch(&mut db, batch).await?
        };
        tracing::info!(
            secs = %format!("{:.2}", store_started.elapsed().as_secs_f64()),
            "Vector storage completed"
        );

        self.records()?.mark_processed(&record.id, chunks)?;

        let total = started.elapsed().as_secs_f64();
        tracing::info!(
            document_id = %record.id,
            chunks,
            secs = %format!("{:.2}", total),
            "Document processing completed"
        );
        if total > self.config.retrieval.slow_processing_secs as f64 {
            tracing::warn!(
                document_id = %record.id,
                secs = %format!("{:.2}", total),
                "Document processing exceeded {} seconds",
                self.config.retrieval.slow_processing_secs
            );
        }

        Ok(chunks)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Questions
    // ─────────────────────────────────────────────────────────────────────────

    /// Nearest `top_k` chunks for the question
    pub async fn query_knowledge_base(&self, question: &str) -> anyhow::Result<Vec<RetrievedChunk>> {
        let db = self.db.read().await;
        self.pipeline.query_knowledge_base(&db, question).await
    }

    /// Raw retrieval with an explicit limit
    pub async fn search(&self, query: &str, limit: usize) -> DocentResult<Vec<RetrievedChunk>> {
        let db = self.db.read().await;
        self.pipeline
            .search(&db, query, limit)
            .await
            .map_err(DocentError::retrieval)
    }

    /// Answer a question from the knowledge base and log the interaction
    pub async fn ask(&self, user: &User, question: &str) -> DocentResult<AskResponse> {
        AskRequest::new(question).validate()?;

        let results = self
            .query_knowledge_base(question)
            .await
            .map_err(DocentError::retrieval)?;

        let context = results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let sources: Vec<String> = results.iter().map(RetrievedChunk::source_label).collect();

        let answer = self
            .generator
            .generate(question, &context)
            .await
            .map_err(DocentError::llm)?;

        let user_id = (!user.is_anonymous()).then_some(user.id);
        if let Err(e) = self
            .records()
            .and_then(|r| r.log_interaction(user_id, question, &answer, &sources))
        {
            tracing::warn!(error = %e, "Failed to log interaction");
        }

        Ok(AskResponse { answer, sources })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Documents, logs, users
    // ─────────────────────────────────────────────────────────────────────────

    pub fn list_documents(&self) -> DocentResult<Vec<DocumentRecord>> {
        Ok(self.records()?.list_documents()?)
    }

    pub fn get_document(&self, id: &str) -> DocentResult<DocumentRecord> {
        self.records()?
            .get_document(id)?
            .ok_or_else(|| DocentError::not_found("Document"))
    }

    /// Remove the record, the stored PDF and the document's chunks
    pub async fn delete_document(&self, id: &str) -> DocentResult<DocumentRecord> {
        let record = self.get_document(id)?;

        self.db.read().await.delete_document(id).await?;
        if !record.file_path.is_empty() {
            if let Err(e) = std::fs::remove_file(&record.file_path) {
                tracing::warn!(path = %record.file_path, error = %e, "Failed to remove stored PDF");
            }
        }
        self.records()?.delete_document(id)?;

        tracing::info!(document_id = id, "Document deleted");
        Ok(record)
    }

    pub async fn chunk_count(&self) -> DocentResult<usize> {
        Ok(self.db.read().await.count().await?)
    }

    /// `None` lists every user's interactions
    pub fn list_interactions(&self, user_id: Option<i64>, limit: usize) -> DocentResult<Vec<InteractionLog>> {
        Ok(self.records()?.list_interactions(user_id, limit)?)
    }

    /// Create the user if needed and return it with its token
    pub fn issue_token(&self, username: &str, rotate: bool) -> DocentResult<User> {
        if username.trim().is_empty() {
            return Err(ValidationError::single("username", "This field may not be blank.").into());
        }
        let records = self.records()?;
        let user = records.create_user(username)?;
        if rotate {
            return records
                .rotate_token(username)?
                .ok_or_else(|| DocentError::not_found("User"));
        }
        Ok(user)
    }

    pub fn authenticate(&self, token: &str) -> DocentResult<Option<User>> {
        Ok(self.records()?.user_for_token(token)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Speech sessions
    // ─────────────────────────────────────────────────────────────────────────

    fn owned_session(&self, user: &User, session_id: &str) -> DocentResult<TtsSession> {
        self.records()?
            .get_tts_session(session_id, user.id)?
            .ok_or_else(|| DocentError::not_found("Speech session"))
    }

    fn session_response(session: &TtsSession) -> SpeechSegmentResponse {
        SpeechSegmentResponse {
            session_id: session.id.clone(),
            state: session.state,
            position: session.position,
            text_length: session.text_length(),
            segment: None,
            audio_base64: None,
            mime_type: None,
            done: session.state == TtsState::Finished,
        }
    }

    /// Create a session and speak its first segment
    pub async fn start_speech(
        &self,
        user: &User,
        text: &str,
        voice: Option<&str>,
    ) -> DocentResult<SpeechSegmentResponse> {
        let request = StartSpeechRequest {
            text: text.to_string(),
            voice_id: voice.map(str::to_string),
        };
        request.validate()?;

        let now = chrono::Utc::now().to_rfc3339();
        let session = TtsSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id,
            text: request.text,
            position: 0,
            voice_id: request
                .voice_id
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| self.config.tts.default_voice.clone()),
            state: TtsState::Playing,
            created_at: now.clone(),
            updated_at: now,
        };
        self.records()?.create_tts_session(&session)?;

        self.speak_next(user, &session.id).await
    }

    /// Synthesize the segment after the stored position and advance it.
    ///
    /// A paused session stays put until it is resumed.
    pub async fn speak_next(&self, user: &User, session_id: &str) -> DocentResult<SpeechSegmentResponse> {
        let session = self.owned_session(user, session_id)?;
        if session.state != TtsState::Playing {
            return Ok(Self::session_response(&session));
        }

        let segment = match tts::next_segment(&session.text, session.position, self.config.tts.segment_chars) {
            Some(segment) => segment,
            None => {
                let len = session.text_length();
                self.records()?.update_tts_position(&session.id, len, TtsState::Finished)?;
                return Ok(Self::session_response(&TtsSession {
                    position: len,
                    state: TtsState::Finished,
                    ..session
                }));
            }
        };

        let spoken = segment.text.trim();
        let audio = if spoken.is_empty() {
            None
        } else {
            let audio = self
                .speech
                .synthesize(spoken, &session.voice_id)
                .await
                .map_err(DocentError::speech)?;
            Some(audio.into_wav())
        };

        let state = if segment.end >= session.text_length() {
            TtsState::Finished
        } else {
            TtsState::Playing
        };
        self.records()?.update_tts_position(&session.id, segment.end, state)?;

        let mut response = Self::session_response(&TtsSession {
            position: segment.end,
            state,
            ..session
        });
        response.segment = Some(segment.text);
        if let Some(audio) = audio {
            use base64::Engine;
            response.audio_base64 = Some(base64::engine::general_purpose::STANDARD.encode(&audio.bytes));
            response.mime_type = Some(audio.mime_type);
        }
        Ok(response)
    }

    /// Store where playback stopped; the position is clamped to the text
    pub fn pause_speech(
        &self,
        user: &User,
        session_id: &str,
        position: Option<usize>,
    ) -> DocentResult<SpeechSegmentResponse> {
        let session = self.owned_session(user, session_id)?;
        if session.state == TtsState::Finished {
            return Ok(Self::session_response(&session));
        }

        let position = position
            .unwrap_or(session.position)
            .min(session.text_length());
        self.records()?.update_tts_position(&session.id, position, TtsState::Paused)?;

        Ok(Self::session_response(&TtsSession {
            position,
            state: TtsState::Paused,
            ..session
        }))
    }

    /// Continue speaking from the stored position
    pub async fn resume_speech(&self, user: &User, session_id: &str) -> DocentResult<SpeechSegmentResponse> {
        let session = self.owned_session(user, session_id)?;
        if session.state == TtsState::Finished {
            return Ok(Self::session_response(&session));
        }

        if session.state == TtsState::Paused {
            self.records()?
                .update_tts_position(&session.id, session.position, TtsState::Playing)?;
        }
        self.speak_next(user, session_id).await
    }

    pub fn stop_speech(&self, user: &User, session_id: &str) -> DocentResult<()> {
        if self.records()?.delete_tts_session(session_id, user.id)? {
            Ok(())
        } else {
            Err(DocentError::not_found("Speech session"))
        }
    }

    pub fn speech_status(&self, user: &User, session_id: &str) -> DocentResult<SpeechSegmentResponse> {
        Ok(Self::session_response(&self.owned_session(user, session_id)?))
    }

    /// Speak a whole text segment by segment into one clip
    pub async fn speak_text(&self, text: &str, voice: Option<&str>) -> DocentResult<SpeechAudio> {
        StartSpeechRequest {
            text: text.to_string(),
            voice_id: None,
        }
        .validate()?;

        let voice = voice.unwrap_or(&self.config.tts.default_voice);
        tts::speak_all(self.speech.as_ref(), text, voice, self.config.tts.segment_chars)
            .await
            .map_err(DocentError::speech)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reset
    // ─────────────────────────────────────────────────────────────────────────

    /// Drop the knowledge base, stored PDFs, documents, logs and sessions
    pub async fn reset_all(&self) -> DocentResult<()> {
        self.db.write().await.reset_all().await?;
        self.records()?.clear_all()?;

        let docs_dir = self.documents_dir();
        if docs_dir.exists() {
            std::fs::remove_dir_all(&docs_dir).context("Failed to remove stored documents")?;
        }
        tracing::info!("Knowledge base reset");
        Ok(())
    }
}
