//! Token authentication
//!
//! Accepts `Authorization: Token <key>` and `Authorization: Bearer <key>`.
//! The resolved [`User`] and the [`Client`] it is throttled as are stored in
//! the request extensions.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use docent::User;
use std::net::SocketAddr;
use std::sync::Arc;

use super::error::ApiError;
use super::limits::Client;
use super::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}

pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (user, client) = if state.require_auth {
        let token = bearer_token(request.headers()).ok_or(ApiError::MissingCredentials)?;
        let user = state
            .docent
            .authenticate(token)?
            .ok_or(ApiError::InvalidToken)?;
        let client = Client::User(user.id);
        (user, client)
    } else {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        (User::anonymous(), Client::Address(peer))
    };

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(client);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_token_schemes() {
        assert_eq!(bearer_token(&headers("Token abc123")), Some("abc123"));
        assert_eq!(bearer_token(&headers("Bearer abc123")), Some("abc123"));
        assert_eq!(bearer_token(&headers("bearer  abc123 ")), Some("abc123"));
        assert_eq!(bearer_token(&headers("Basic dXNlcg==")), None);
        assert_eq!(bearer_token(&headers("Token")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
