//! HTTP API route handlers

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::{json, Value};
use std::sync::Arc;

use docent::{
    AskRequest, AskResponse, DocentError, PauseSpeechRequest, SpeechSegmentResponse, StartSpeechRequest,
    UploadRequest, UploadResponse, User,
};

use super::error::ApiError;
use super::limits::{Client, Scope};
use super::state::AppState;
use crate::utils::data_size;

/// Upper bound for `GET /api/interactions?limit=`
const MAX_INTERACTIONS: usize = 100;

type ApiResult<T> = Result<T, ApiError>;

fn throttle(state: &AppState, scope: Scope, client: Client) -> ApiResult<()> {
    state
        .limiter
        .check(scope, client)
        .map_err(ApiError::Throttled)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid multipart body: {}", err))
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents and questions
// ─────────────────────────────────────────────────────────────────────────────

pub async fn handle_upload(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Extension(client): Extension<Client>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    throttle(&state, Scope::Upload, client)?;

    let mut request = UploadRequest {
        file_name: String::new(),
        original_name: String::new(),
        bytes: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file_name" => {
                request.file_name = field.text().await.map_err(multipart_error)?;
            }
            "file" => {
                request.original_name = field.file_name().unwrap_or_default().to_string();
                request.bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
            }
            _ => {}
        }
    }

    tracing::info!(
        user = %user.username,
        file_name = %request.file_name,
        bytes = request.bytes.len(),
        "Upload received"
    );

    let response = state.docent.upload_document(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn handle_ask(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Extension(client): Extension<Client>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<Json<AskResponse>> {
    throttle(&state, Scope::Ask, client)?;
    let request = json_body(payload)?;
    request.validate().map_err(DocentError::from)?;

    let question = request.question.unwrap_or_default();
    let response = state.docent.ask(&user, &question).await?;
    Ok(Json(response))
}

pub async fn handle_list_documents(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let documents = state.docent.list_documents()?;
    Ok(Json(json!({ "documents": documents })))
}

pub async fn handle_get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.docent.get_document(&id)?))
}

pub async fn handle_delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = state.docent.delete_document(&id).await?;
    Ok(Json(json!({ "deleted": record.id })))
}

pub async fn handle_interactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<docent::InteractionsQuery>,
) -> ApiResult<Json<Value>> {
    let user_id = (!user.is_anonymous()).then_some(user.id);
    let interactions = state
        .docent
        .list_interactions(user_id, query.limit.min(MAX_INTERACTIONS))?;
    Ok(Json(json!({ "interactions": interactions })))
}

pub async fn handle_info(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let docent = &state.docent;
    let config = docent.config();
    let data_dir = docent.data_dir();

    let documents = docent.list_documents()?;
    let chunk_count = docent.chunk_count().await?;
    let size = data_size(data_dir);

    Ok(Json(json!({
        "stats": {
            "document_count": documents.len(),
            "chunk_count": chunk_count
        },
        "storage": {
            "vector_db_bytes": size.vectors,
            "records_db_bytes": size.records,
            "documents_bytes": size.documents
        },
        "embedding_model": {
            "name": config.embedding_model.name,
            "dimensions": config.embedding_model.dimensions,
            "device": docent.device_name()
        },
        "llm_model": config.llm.model,
        "tts_model": config.tts.model
    })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Speech sessions
// ─────────────────────────────────────────────────────────────────────────────

pub async fn handle_start_speech(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<StartSpeechRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SpeechSegmentResponse>)> {
    let request = json_body(payload)?;
    let response = state
        .docent
        .start_speech(&user, &request.text, request.voice_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn handle_next_segment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> ApiResult<Json<SpeechSegmentResponse>> {
    Ok(Json(state.docent.speak_next(&user, &id).await?))
}

pub async fn handle_pause_speech(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    payload: Result<Json<PauseSpeechRequest>, JsonRejection>,
) -> ApiResult<Json<SpeechSegmentResponse>> {
    let position = json_body(payload)?.position;
    Ok(Json(state.docent.pause_speech(&user, &id, position)?))
}

pub async fn handle_resume_speech(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> ApiResult<Json<SpeechSegmentResponse>> {
    Ok(Json(state.docent.resume_speech(&user, &id).await?))
}

pub async fn handle_speech_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> ApiResult<Json<SpeechSegmentResponse>> {
    Ok(Json(state.docent.speech_status(&user, &id)?))
}

pub async fn handle_stop_speech(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.docent.stop_speech(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

pub async fn handle_schema() -> Json<Value> {
    Json(openapi_schema())
}

fn operation(summary: &str, ok: &str) -> Value {
    json!({
        "summary": summary,
        "security": [{ "tokenAuth": [] }],
        "responses": {
            ok: { "description": "Success" },
            "400": { "description": "Validation error" },
            "401": { "description": "Missing or invalid token" }
        }
    })
}

/// OpenAPI 3 description of the API
pub fn openapi_schema() -> Value {
    let session_id = json!([{ "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }]);

    let mut upload = operation("Upload a PDF and rebuild the knowledge base from it", "201");
    upload["requestBody"] = json!({
        "required": true,
        "content": { "multipart/form-data": { "schema": {
            "type": "object",
            "required": ["file_name", "file"],
            "properties": {
                "file_name": { "type": "string", "maxLength": 255 },
                "file": { "type": "string", "format": "binary" }
            }
        }}}
    });
    upload["responses"]["429"] = json!({ "description": "Throttled" });

    let mut ask = operation("Answer a question from the uploaded document", "200");
    ask["requestBody"] = json!({
        "required": true,
        "content": { "application/json": { "schema": {
            "type": "object",
            "required": ["question"],
            "properties": { "question": { "type": "string", "maxLength": 1000 } }
        }}}
    });
    ask["responses"]["429"] = json!({ "description": "Throttled" });

    let mut start = operation("Start reading a text aloud", "201");
    start["requestBody"] = json!({
        "required": true,
        "content": { "application/json": { "schema": {
            "type": "object",
            "required": ["text"],
            "properties": {
                "text": { "type": "string" },
                "voice_id": { "type": "string" }
            }
        }}}
    });

    let with_id = |summary: &str, ok: &str| {
        let mut op = operation(summary, ok);
        op["parameters"] = session_id.clone();
        op["responses"]["404"] = json!({ "description": "Not found" });
        op
    };

    let mut pause = with_id("Pause at the reported playback position", "200");
    pause["requestBody"] = json!({
        "required": true,
        "content": { "application/json": { "schema": {
            "type": "object",
            "properties": { "position": { "type": "integer", "minimum": 0 } }
        }}}
    });

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Docent API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Question answering over an uploaded PDF, with speech playback"
        },
        "components": {
            "securitySchemes": {
                "tokenAuth": {
                    "type": "apiKey",
                    "in": "header",
                    "name": "Authorization",
                    "description": "Token <key>"
                }
            }
        },
        "paths": {
            "/api/upload-document/": { "post": upload },
            "/api/ask-question/": { "post": ask },
            "/api/documents": { "get": operation("List uploaded documents", "200") },
            "/api/documents/{id}": {
                "get": with_id("Get a document", "200"),
                "delete": with_id("Delete a document and its chunks", "200")
            },
            "/api/interactions": { "get": operation("List the caller's questions and answers", "200") },
            "/api/info": { "get": operation("Storage and model information", "200") },
            "/api/tts": { "post": start },
            "/api/tts/{id}": {
                "get": with_id("Speech session status", "200"),
                "delete": with_id("Stop and remove a speech session", "204")
            },
            "/api/tts/{id}/next": { "post": with_id("Synthesize the next segment", "200") },
            "/api/tts/{id}/pause": { "post": pause },
            "/api/tts/{id}/resume": { "post": with_id("Resume from the stored position", "200") }
        }
    })
}
