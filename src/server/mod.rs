//! HTTP server module

mod auth;
mod error;
mod limits;
mod routes;
mod state;

pub use error::ApiError;
pub use state::AppState;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use docent::Docent;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Run the HTTP server
pub async fn run_server(docent: Docent, port: u16) -> Result<()> {
    let docent = Arc::new(docent);
    let require_auth = docent.config().server.require_auth;
    let app = create_router(Arc::new(AppState::new(docent)));

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            eprintln!("\n\x1b[31mError:\x1b[0m Port {} is already in use.\n", port);
            eprintln!("Try a different port with:");
            eprintln!("  \x1b[36mdocent serve --port <PORT>\x1b[0m\n");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Server running on http://localhost:{}", port);
    println!("\nAPI Endpoints:");
    println!("  GET    /health                  - Health check");
    println!("  GET    /api/schema              - OpenAPI schema");
    println!("  POST   /api/upload-document/    - Upload a PDF (multipart: file_name, file)");
    println!("  POST   /api/ask-question/       - Ask a question");
    println!("  GET    /api/documents           - List documents");
    println!("  DELETE /api/documents/:id       - Delete a document");
    println!("  GET    /api/interactions        - Your questions and answers");
    println!("  GET    /api/info                - Storage and model info");
    println!("  POST   /api/tts                 - Start reading a text aloud");
    println!("  POST   /api/tts/:id/next        - Next audio segment");
    println!("  POST   /api/tts/:id/pause       - Pause at a position");
    println!("  POST   /api/tts/:id/resume      - Resume playback");
    println!("  GET    /api/tts/:id             - Session status");
    println!("  DELETE /api/tts/:id             - Stop and remove a session");
    if require_auth {
        println!("\nAuthenticate with `Authorization: Token <key>` (create one with `docent token <username>`).");
    } else {
        println!("\nAuthentication is disabled (server.require_auth = false).");
    }

    // Peer addresses key the throttle for unauthenticated callers
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Oversized files must still reach validation to get a field error
    let body_limit = state.docent.config().upload.max_file_bytes.saturating_mul(2);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", create_api_routes(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create API routes; everything except the schema requires a user
fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upload-document/", post(routes::handle_upload))
        .route("/upload-document", post(routes::handle_upload))
        .route("/ask-question/", post(routes::handle_ask))
        .route("/ask-question", post(routes::handle_ask))
        .route("/documents", get(routes::handle_list_documents))
        .route("/documents/", get(routes::handle_list_documents))
        .route(
            "/documents/:id",
            get(routes::handle_get_document).delete(routes::handle_delete_document),
        )
        .route("/interactions", get(routes::handle_interactions))
        .route("/interactions/", get(routes::handle_interactions))
        .route("/info", get(routes::handle_info))
        .route("/tts", post(routes::handle_start_speech))
        .route("/tts/", post(routes::handle_start_speech))
        .route(
            "/tts/:id",
            get(routes::handle_speech_status).delete(routes::handle_stop_speech),
        )
        .route("/tts/:id/next", post(routes::handle_next_segment))
        .route("/tts/:id/pause", post(routes::handle_pause_speech))
        .route("/tts/:id/resume", post(routes::handle_resume_speech))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), auth::require_user))
        .route("/schema", get(routes::handle_schema))
        .route("/schema/", get(routes::handle_schema))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use docent::{AnswerGenerator, Config, EmbeddingProvider, SpeechAudio, SpeechSynthesizer};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Letter-frequency vectors: texts sharing words land close together
    struct LetterEmbedder;

    impl EmbeddingProvider for LetterEmbedder {
        fn embed_batch(&self, texts: &[String]) -> AnyResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] += 1.0;
                    }
                    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
                    v.iter().map(|x| x / norm).collect()
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            26
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl AnswerGenerator for EchoGenerator {
        async fn generate(&self, question: &str, context: &str) -> AnyResult<String> {
            Ok(format!("{} | {}", question, context.len()))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct Beeper;

    #[async_trait]
    impl SpeechSynthesizer for Beeper {
        async fn synthesize(&self, text: &str, _voice: &str) -> AnyResult<SpeechAudio> {
            Ok(SpeechAudio {
                bytes: vec![0u8; text.chars().count() * 2],
                mime_type: "audio/L16;codec=pcm;rate=24000".to_string(),
            })
        }

        fn name(&self) -> &str {
            "beeper"
        }
    }

    async fn app_with(config: Config) -> (Router, Arc<Docent>, TempDir) {
        let dir = TempDir::new().unwrap();
        let docent = Docent::with_components(
            config,
            dir.path(),
            Arc::new(LetterEmbedder),
            Arc::new(EchoGenerator),
            Arc::new(Beeper),
        )
        .await
        .unwrap();
        let docent = Arc::new(docent);
        let router = create_router(Arc::new(AppState::new(Arc::clone(&docent))));
        (router, docent, dir)
    }

    async fn app() -> (Router, Arc<Docent>, TempDir) {
        app_with(Config::default()).await
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    /// Anonymous request as it arrives through `into_make_service_with_connect_info`
    fn from_peer(mut request: Request<Body>, peer: [u8; 4]) -> Request<Body> {
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 4000))));
        request
    }

    fn multipart_upload(token: &str, file_name: &str, original: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "docent-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file_name\"\r\n\r\n{name}\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{orig}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                name = file_name,
                orig = original
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::post("/api/upload-document/")
            .header(header::AUTHORIZATION, format!("Token {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_schema_are_public() {
        let (router, _docent, _dir) = app().await;

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, schema) = send(&router, Request::get("/api/schema").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(schema["openapi"], "3.0.3");
        assert!(schema["paths"]["/api/ask-question/"]["post"].is_object());
    }

    #[tokio::test]
    async fn test_missing_and_invalid_tokens() {
        let (router, _docent, _dir) = app().await;

        let (status, body) = send(&router, post_json("/api/ask-question/", None, json!({"question": "hi"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"detail": "Authentication credentials were not provided."}));

        let (status, body) = send(&router, post_json("/api/ask-question/", Some("nope"), json!({"question": "hi"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"detail": "Invalid token."}));
    }

    #[tokio::test]
    async fn test_ask_returns_answer_and_sources() {
        let (router, docent, _dir) = app().await;
        let token = docent.issue_token("alice", false).unwrap().token;
        docent
            .ingest_text("handbook", "\n[Page 1] Vacation requests go to your manager.")
            .await
            .unwrap();

        let (status, body) = send(
            &router,
            post_json("/api/ask-question", Some(&token), json!({"question": "Who approves vacation?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["answer"].as_str().unwrap().starts_with("Who approves vacation? |"));
        assert_eq!(body["sources"], json!(["handbook - Page 1"]));

        let request = Request::get("/api/interactions")
            .header(header::AUTHORIZATION, format!("Token {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interactions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_question_is_field_error() {
        let (router, docent, _dir) = app().await;
        let token = docent.issue_token("bob", false).unwrap().token;

        let (status, body) = send(&router, post_json("/api/ask-question/", Some(&token), json!({"question": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"question": ["This field may not be blank."]}));
    }

    #[tokio::test]
    async fn test_missing_question_is_field_error() {
        let (router, docent, _dir) = app().await;
        let token = docent.issue_token("hana", false).unwrap().token;

        let (status, body) = send(&router, post_json("/api/ask-question/", Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"question": ["This field is required."]}));
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_is_retrieval_error() {
        let (router, docent, _dir) = app().await;
        let token = docent.issue_token("carol", false).unwrap().token;

        let (status, body) = send(&router, post_json("/api/ask-question/", Some(&token), json!({"question": "Anything?"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("Failed to retrieve context"));
    }

    #[tokio::test]
    async fn test_ask_is_throttled_per_user() {
        let mut config = Config::default();
        config.server.ask_per_minute = 1;
        let (router, docent, _dir) = app_with(config).await;
        let token = docent.issue_token("dave", false).unwrap().token;

        let (status, _) = send(&router, post_json("/api/ask-question/", Some(&token), json!({"question": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&router, post_json("/api/ask-question/", Some(&token), json!({"question": "again"}))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["detail"].as_str().unwrap().starts_with("Request was throttled."));

        let other = docent.issue_token("erin", false).unwrap().token;
        let (status, _) = send(&router, post_json("/api/ask-question/", Some(&other), json!({"question": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_anonymous_ask_is_throttled_per_address() {
        let mut config = Config::default();
        config.server.require_auth = false;
        config.server.ask_per_minute = 1;
        let (router, _docent, _dir) = app_with(config).await;
        let blank = || post_json("/api/ask-question/", None, json!({"question": " "}));

        let (status, _) = send(&router, from_peer(blank(), [10, 0, 0, 1])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&router, from_peer(blank(), [10, 0, 0, 1])).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _) = send(&router, from_peer(blank(), [10, 0, 0, 2])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_pdf_upload_over_http() {
        let (router, docent, _dir) = app().await;
        let token = docent.issue_token("ivan", false).unwrap().token;
        let pdf = include_bytes!("../../tests/fixtures/two_pages.pdf");

        let (status, body) = send(&router, multipart_upload(&token, "handbook", "handbook.pdf", pdf)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["file_name"], "handbook");
        assert_eq!(body["message"], "Document uploaded and processed successfully");
        assert!(body["chunks"].as_u64().unwrap() > 0);
        assert_eq!(docent.list_documents().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_pdf() {
        let (router, docent, _dir) = app().await;
        let token = docent.issue_token("frank", false).unwrap().token;

        let (status, body) = send(&router, multipart_upload(&token, "notes", "notes.txt", b"plain text")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"file": ["Only PDF files are allowed."]}));
    }

    #[tokio::test]
    async fn test_upload_of_broken_pdf_leaves_nothing() {
        let (router, docent, _dir) = app().await;
        let token = docent.issue_token("gina", false).unwrap().token;

        let (status, body) = send(&router, multipart_upload(&token, "broken", "broken.pdf", b"not a pdf")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("Processing failed"));
        assert!(docent.list_documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_speech_session_over_http() {
        let mut config = Config::default();
        config.server.require_auth = false;
        config.tts.segment_chars = 10;
        let (router, _docent, _dir) = app_with(config).await;

        let (status, body) = send(&router, post_json("/api/tts", None, json!({"text": "One two. Three four five six."}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["state"], "playing");
        assert_eq!(body["mime_type"], "audio/wav");
        let id = body["session_id"].as_str().unwrap().to_string();

        let (status, body) = send(&router, post_json(&format!("/api/tts/{}/pause", id), None, json!({"position": 500}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "paused");
        assert_eq!(body["position"], body["text_length"]);

        let malformed = Request::post(format!("/api/tts/{}/pause", id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let (status, _) = send(&router, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&router, post_json(&format!("/api/tts/{}/resume", id), None, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["done"], true);
        assert!(body["audio_base64"].is_null());

        let request = Request::delete(format!("/api/tts/{}", id)).body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (status, body) = send(&router, Request::get(format!("/api/tts/{}", id)).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Not found."}));
    }
}
