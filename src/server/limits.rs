//! Per-client request throttling
//!
//! Fixed one-minute windows keyed by (scope, client). A client is the
//! authenticated user, or the peer address when authentication is off.
//! Enough for a single process; counters are lost on restart.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Upload,
    Ask,
}

/// Who a request is counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Client {
    User(i64),
    /// Unauthenticated caller; `None` when the peer address is unknown
    Address(Option<IpAddr>),
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    upload_per_minute: u32,
    ask_per_minute: u32,
    windows: Arc<Mutex<HashMap<(Scope, Client), Window>>>,
}

impl RateLimiter {
    pub fn new(upload_per_minute: u32, ask_per_minute: u32) -> Self {
        Self {
            upload_per_minute,
            ask_per_minute,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn limit(&self, scope: Scope) -> u32 {
        match scope {
            Scope::Upload => self.upload_per_minute,
            Scope::Ask => self.ask_per_minute,
        }
    }

    /// Count a request; `Err(seconds)` is how long until the window resets
    pub fn check(&self, scope: Scope, client: Client) -> Result<(), u64> {
        self.check_at(scope, client, Instant::now())
    }

    fn check_at(&self, scope: Scope, client: Client, now: Instant) -> Result<(), u64> {
        let limit = self.limit(scope);
        if limit == 0 {
            return Ok(());
        }

        // Counters only; a poisoned lock is still usable
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        let window = windows.entry((scope, client)).or_insert(Window { started: now, count: 0 });

        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.count = 0;
        }

        if window.count >= limit {
            let remaining = WINDOW.saturating_sub(now.duration_since(window.started));
            return Err(remaining.as_secs().max(1));
        }

        window.count += 1;
        Ok(())
    }
}
