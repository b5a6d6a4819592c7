//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docent::DocentError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Docent(#[from] DocentError),

    #[error("Authentication credentials were not provided.")]
    MissingCredentials,

    #[error("Invalid token.")]
    InvalidToken,

    #[error("Request was throttled. Expected available in {0} seconds.")]
    Throttled(u64),

    /// Malformed request body (bad JSON or multipart)
    #[error("{0}")]
    BadRequest(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Docent(DocentError::Internal(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Docent(DocentError::Validation(fields)) => {
                (StatusCode::BAD_REQUEST, json!(fields))
            }
            ApiError::Docent(DocentError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, json!({ "detail": "Not found." }))
            }
            ApiError::Docent(err) => {
                tracing::error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": err.to_string() }))
            }
            ApiError::MissingCredentials | ApiError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, json!({ "detail": self.to_string() }))
            }
            ApiError::Throttled(_) => {
                (StatusCode::TOO_MANY_REQUESTS, json!({ "detail": self.to_string() }))
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "detail": msg }))
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::Throttled(wait) = self {
            if let Ok(value) = wait.to_string().parse() {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent::ValidationError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_maps_to_field_errors() {
        let err: ApiError = DocentError::from(ValidationError::single("question", "This field may not be blank.")).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "question": ["This field may not be blank."] })
        );
    }

    #[tokio::test]
    async fn test_pipeline_failures_are_500_with_error_key() {
        let err: ApiError = DocentError::Llm("quota exceeded".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "LLM processing failed: quota exceeded" })
        );
    }

    #[tokio::test]
    async fn test_throttled_sets_retry_after() {
        let response = ApiError::Throttled(42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "Request was throttled. Expected available in 42 seconds." })
        );
    }

    #[tokio::test]
    async fn test_not_found_detail() {
        let response = ApiError::from(DocentError::not_found("Document")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({ "detail": "Not found." }));
    }
}
