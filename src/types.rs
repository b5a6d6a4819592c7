use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_FILE_NAME_CHARS: usize = 255;
pub const MAX_QUESTION_CHARS: usize = 1000;

// ============================================================================
// Stored records
// ============================================================================

/// An uploaded PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub file_name: String,
    /// Where the PDF is kept under the data dir
    pub file_path: String,
    pub uploaded_at: String,
    pub chunk_count: u32,
    /// Set once the document is embedded into the knowledge base
    pub processed_at: Option<String>,
}

/// A question/answer pair recorded after a successful ask
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub created_at: String,
}

/// An API user and their token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: String,
}

impl User {
    /// Caller used when authentication is disabled
    pub fn anonymous() -> Self {
        Self {
            id: 0,
            username: "anonymous".to_string(),
            token: String::new(),
            created_at: String::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == 0
    }
}

/// Chunk returned by a vector search
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub id: String,
    pub document_id: String,
    pub file_name: String,
    pub chunk_index: u32,
    pub page: u32,
    pub content: String,
    pub score: f32,
}

/// Context handed to the answer generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub file_name: String,
    pub page: u32,
    pub score: f32,
}

impl RetrievedChunk {
    /// `"{file_name} - Page {page}"`
    pub fn source_label(&self) -> String {
        format!("{} - Page {}", self.file_name, self.page)
    }
}

impl From<ChunkMatch> for RetrievedChunk {
    fn from(m: ChunkMatch) -> Self {
        Self {
            text: m.content,
            file_name: m.file_name,
            page: m.page,
            score: m.score,
        }
    }
}

// ============================================================================
// Speech sessions
// ============================================================================

/// Playback state of a speech session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsState {
    Playing,
    Paused,
    Finished,
}

impl std::fmt::Display for TtsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TtsState::Playing => write!(f, "playing"),
            TtsState::Paused => write!(f, "paused"),
            TtsState::Finished => write!(f, "finished"),
        }
    }
}

impl std::str::FromStr for TtsState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playing" => Ok(TtsState::Playing),
            "paused" => Ok(TtsState::Paused),
            "finished" => Ok(TtsState::Finished),
            _ => Err(format!("Unknown speech state: {}", s)),
        }
    }
}

/// Text being read aloud and how far playback got
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSession {
    pub id: String,
    pub user_id: i64,
    pub text: String,
    /// Characters already spoken
    pub position: usize,
    pub voice_id: String,
    pub state: TtsState,
    pub created_at: String,
    pub updated_at: String,
}

impl TtsSession {
    pub fn text_length(&self) -> usize {
        self.text.chars().count()
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Field-level validation failures, serialized as `{"field": ["message"]}`
#[derive(Debug, Clone, Default, PartialEq, thiserror::Error, Serialize)]
#[error("invalid request: {}", summary(.0))]
#[serde(transparent)]
pub struct ValidationError(pub BTreeMap<String, Vec<String>>);

fn summary(fields: &BTreeMap<String, Vec<String>>) -> String {
    fields
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: &str) -> Self {
        let mut err = Self::new();
        err.add(field, message);
        err
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(|m| m.as_slice()).unwrap_or(&[])
    }

    fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn check_text(errors: &mut ValidationError, field: &str, value: &str, max_chars: usize) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if value.chars().count() > max_chars {
        errors.add(
            field,
            &format!("Ensure this field has no more than {} characters.", max_chars),
        );
    }
}

// ============================================================================
// API payloads
// ============================================================================

/// A PDF upload (multipart `file_name` + `file`)
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Display name supplied by the client
    pub file_name: String,
    /// Name of the uploaded file itself
    pub original_name: String,
    pub bytes: Vec<u8>,
}

impl UploadRequest {
    pub fn validate(&self, max_file_bytes: usize) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();

        check_text(&mut errors, "file_name", &self.file_name, MAX_FILE_NAME_CHARS);

        if self.original_name.is_empty() && self.bytes.is_empty() {
            errors.add("file", "No file was submitted.");
        } else if !self.original_name.to_lowercase().ends_with(".pdf") {
            errors.add("file", "Only PDF files are allowed.");
        } else if self.bytes.len() > max_file_bytes {
            errors.add(
                "file",
                &format!("File size exceeds {}MB limit.", max_file_bytes / (1024 * 1024)),
            );
        }

        errors.into_result()
    }
}

/// `POST /api/upload-document/` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub file_name: String,
    pub document_id: String,
    pub chunks: u32,
}

/// `POST /api/ask-question/` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// `None` when the key is absent, which is reported apart from a blank value
    #[serde(default)]
    pub question: Option<String>,
}

impl AskRequest {
    pub fn new(question: &str) -> Self {
        Self {
            question: Some(question.to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        match &self.question {
            Some(question) => check_text(&mut errors, "question", question, MAX_QUESTION_CHARS),
            None => errors.add("question", "This field is required."),
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<String>,
}

/// `POST /api/tts` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSpeechRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voice_id: Option<String>,
}

impl StartSpeechRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::single("text", "This field may not be blank."));
        }
        Ok(())
    }
}

/// `POST /api/tts/:id/pause` body; `position` is where the player stopped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PauseSpeechRequest {
    #[serde(default)]
    pub position: Option<usize>,
}

/// One synthesized segment and where the session now stands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSegmentResponse {
    pub session_id: String,
    pub state: TtsState,
    pub position: usize,
    pub text_length: usize,
    /// Text of the segment that was synthesized
    pub segment: Option<String>,
    /// Base64 WAV (or whatever the synthesizer returned)
    pub audio_base64: Option<String>,
    pub mime_type: Option<String>,
    pub done: bool,
}

/// Query string for `GET /api/interactions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, original: &str, size: usize) -> UploadRequest {
        UploadRequest {
            file_name: name.to_string(),
            original_name: original.to_string(),
            bytes: vec![0u8; size],
        }
    }

    #[test]
    fn test_tts_state_roundtrip() {
        for state in [TtsState::Playing, TtsState::Paused, TtsState::Finished] {
            let s = state.to_string();
            let parsed: TtsState = s.parse().unwrap();
            assert_eq!(state, parsed);
        }
        assert!("stopped".parse::<TtsState>().is_err());
    }

    #[test]
    fn test_upload_valid() {
        assert!(upload("Manual", "manual.PDF", 100).validate(1024).is_ok());
    }

    #[test]
    fn test_upload_rejects_non_pdf() {
        let err = upload("Notes", "notes.txt", 10).validate(1024).unwrap_err();
        assert_eq!(err.messages("file"), ["Only PDF files are allowed."]);
    }

    #[test]
    fn test_upload_rejects_oversize() {
        let max = 10 * 1024 * 1024;
        let err = upload("Big", "big.pdf", max + 1).validate(max).unwrap_err();
        assert_eq!(err.messages("file"), ["File size exceeds 10MB limit."]);
        assert!(upload("Edge", "edge.pdf", max).validate(max).is_ok());
    }

    #[test]
    fn test_upload_rejects_blank_and_long_names() {
        let err = upload("  ", "a.pdf", 1).validate(1024).unwrap_err();
        assert_eq!(err.messages("file_name"), ["This field may not be blank."]);

        let long = "n".repeat(256);
        let err = upload(&long, "a.pdf", 1).validate(1024).unwrap_err();
        assert!(err.messages("file_name")[0].contains("255"));
    }

    #[test]
    fn test_upload_missing_file() {
        let err = upload("Name", "", 0).validate(1024).unwrap_err();
        assert_eq!(err.messages("file"), ["No file was submitted."]);
    }

    #[test]
    fn test_question_limits() {
        assert!(AskRequest::new("What is it?").validate().is_ok());
        assert!(AskRequest::new("").validate().is_err());

        let long = AskRequest::new(&"q".repeat(1001));
        let err = long.validate().unwrap_err();
        assert_eq!(
            err.messages("question"),
            ["Ensure this field has no more than 1000 characters."]
        );
        assert!(AskRequest::new(&"é".repeat(1000)).validate().is_ok());
    }

    #[test]
    fn test_missing_question_is_required() {
        let request: AskRequest = serde_json::from_str("{}").unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.messages("question"), ["This field is required."]);

        let request: AskRequest = serde_json::from_str(r#"{"question": " "}"#).unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.messages("question"), ["This field may not be blank."]);
    }

    #[test]
    fn test_validation_error_json() {
        let err = ValidationError::single("question", "This field may not be blank.");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({"question": ["This field may not be blank."]}));
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn test_source_label() {
        let chunk = RetrievedChunk {
            text: "t".into(),
            file_name: "Handbook".into(),
            page: 4,
            score: 0.9,
        };
        assert_eq!(chunk.source_label(), "Handbook - Page 4");
    }

    #[test]
    fn test_default_interactions_limit() {
        let q: InteractionsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.limit, 20);
    }
}
