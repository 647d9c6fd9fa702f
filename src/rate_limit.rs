//! # Rate Limit
//! Fixed-window request limiter keyed by client address.
//!
//! Each address gets `max_requests` per window; the window starts at the
//! first request and resets once it has fully elapsed. Rejected requests
//! never reach the handler.
//!
//! The client address is the socket peer unless `trusted_proxies` is set,
//! in which case `X-Forwarded-For` is walked from the right past that many
//! proxies (the peer counts as the first one).

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;

const LIMIT_MESSAGE: &str = "Too many requests, please wait before retrying.";
const UNKNOWN_CLIENT: &str = "unknown";

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32, reset_secs: u64 },
    Limited { retry_after_secs: u64 },
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Default)]
struct Windows {
    by_key: HashMap<String, Window>,
    // Expired windows are dropped at most once per window length.
    last_sweep: Option<Instant>,
}

/// Thread-safe fixed-window counter per client key.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    trusted_proxies: usize,
    inner: Mutex<Windows>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            trusted_proxies: 0,
            inner: Mutex::new(Windows::default()),
        }
    }

    /// Number of reverse proxies in front of the server, the socket peer
    /// included. `0` ignores `X-Forwarded-For` entirely.
    pub fn with_trusted_proxies(mut self, trusted_proxies: usize) -> Self {
        self.trusted_proxies = trusted_proxies;
        self
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn trusted_proxies(&self) -> usize {
        self.trusted_proxies
    }

    /// Count one request for `key` at the current instant.
    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let window = self.window;

        match state.last_sweep {
            Some(at) if now.duration_since(at) < window => {}
            Some(_) => {
                state
                    .by_key
                    .retain(|_, w| now.duration_since(w.started) < window);
                state.last_sweep = Some(now);
            }
            None => state.last_sweep = Some(now),
        }

        let w = state.by_key.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(w.started) >= window {
            w.started = now;
            w.count = 0;
        }

        let reset_secs = secs_ceil(window.saturating_sub(now.duration_since(w.started)));
        if w.count >= self.max_requests {
            return RateDecision::Limited {
                retry_after_secs: reset_secs.max(1),
            };
        }
        w.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - w.count,
            reset_secs,
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).by_key.len()
    }
}

fn secs_ceil(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Client address for a request; see the module docs for the proxy walk.
pub fn client_key(req: &Request, trusted_proxies: usize) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok());

    resolve_client(forwarded, peer, trusted_proxies).unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Walk the chain nearest-first (peer, then forwarded hops right to left)
/// and skip `trusted_proxies` entries. A short chain yields its far end.
pub fn resolve_client(
    forwarded: Option<&str>,
    peer: Option<IpAddr>,
    trusted_proxies: usize,
) -> Option<String> {
    let peer = peer?.to_string();
    if trusted_proxies == 0 {
        return Some(peer);
    }

    let hops: Vec<&str> = forwarded
        .map(|v| v.split(',').map(str::trim).filter(|h| !h.is_empty()).collect())
        .unwrap_or_default();
    let chain: Vec<&str> = std::iter::once(peer.as_str())
        .chain(hops.into_iter().rev())
        .collect();

    let idx = trusted_proxies.min(chain.len() - 1);
    Some(chain[idx].to_string())
}

/// Axum middleware: reject over-limit clients with 429 before the handler runs.
pub async fn enforce(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_key(&req, limiter.trusted_proxies());
    let limit = limiter.max_requests();

    match limiter.check(&key) {
        RateDecision::Allowed {
            remaining,
            reset_secs,
        } => {
            let mut resp = next.run(req).await;
            let h = resp.headers_mut();
            h.insert("ratelimit-limit", HeaderValue::from(limit));
            h.insert("ratelimit-remaining", HeaderValue::from(remaining));
            h.insert("ratelimit-reset", HeaderValue::from(reset_secs));
            resp
        }
        RateDecision::Limited { retry_after_secs } => {
            counter!("rate_limit_rejections_total").increment(1);
            tracing::info!(client = %key, retry_after_secs, "rate limit exceeded");
            let mut resp = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({ "message": LIMIT_MESSAGE })),
            )
                .into_response();
            let h = resp.headers_mut();
            h.insert("ratelimit-limit", HeaderValue::from(limit));
            h.insert("ratelimit-remaining", HeaderValue::from(0u32));
            h.insert("ratelimit-reset", HeaderValue::from(retry_after_secs));
            h.insert("retry-after", HeaderValue::from(retry_after_secs));
            resp
        }
    }
}
