//! Server application state

use std::sync::Arc;

use docent::Docent;

use super::limits::RateLimiter;

/// Shared application state for all route handlers
pub struct AppState {
    pub docent: Arc<Docent>,
    pub limiter: RateLimiter,
    pub require_auth: bool,
}

impl AppState {
    pub fn new(docent: Arc<Docent>) -> Self {
        let server = &docent.config().server;
        let limiter = RateLimiter::new(server.upload_per_minute, server.ask_per_minute);
        let require_auth = server.require_auth;
        Self {
            docent,
            limiter,
            require_auth,
        }
    }
}
