/*!
 * # Rate Limiting Module
 *
 * Fixed-window, in-memory request limiter keyed by client address. Used to
 * throttle self-registration; each server process keeps its own counters.
 *
 * The key is the TCP peer address. Forwarded-for headers are only consulted
 * when the limiter is configured to trust a reverse proxy in front of it.
 */
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

fn num_to_header_value<T: ToString>(n: T) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded")]
    LimitExceeded { retry_after: Duration },
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn roll_window(&mut self, now: Instant, window_duration: Duration) {
        if now.duration_since(self.window_start) >= window_duration {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn time_until_reset(&self, now: Instant, window_duration: Duration) -> Duration {
        window_duration.saturating_sub(now.duration_since(self.window_start))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
    pub enable_headers: bool,
    /// Key on `X-Forwarded-For`/`X-Real-IP` instead of the peer address
    pub trust_forwarded_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 5,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
            trust_forwarded_headers: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: Duration,
}

#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, RateLimitEntry>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counts one request against `key` and reports whether it fits in the current window.
    pub fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        let limit = self.config.requests_per_window;
        let window = self.config.window_duration;

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));
        entry.roll_window(now, window);

        if entry.count >= limit {
            return RateLimitResult {
                allowed: false,
                limit,
                remaining: 0,
                reset_time: entry.time_until_reset(now, window),
            };
        }

        entry.count += 1;
        RateLimitResult {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset_time: entry.time_until_reset(now, window),
        }
    }

    /// Drops entries whose window has elapsed.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.config.window_duration;
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < window);
    }
}

/// Limiter key for `request`: the forwarded client when the proxy is trusted,
/// otherwise the peer address recorded by the listener.
pub fn extract_ip_key(request: &Request, trust_forwarded: bool) -> String {
    let forwarded = if trust_forwarded {
        client_ip(request.headers())
    } else {
        None
    };
    let ip = forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| peer.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());
    format!("ip:{}", ip)
}

/// First address in `X-Forwarded-For`, then `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Middleware for `from_fn_with_state`; rejects with 429 once the window is spent.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let key = extract_ip_key(&request, limiter.config.trust_forwarded_headers);
    let result = limiter.check_rate_limit(&key);

    if !result.allowed {
        warn!(key = %key, "rate limit exceeded");
        let mut response = RateLimitError::LimitExceeded {
            retry_after: result.reset_time,
        }
        .into_response();
        if limiter.config.enable_headers {
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", num_to_header_value(result.limit));
            headers.insert("X-RateLimit-Remaining", num_to_header_value(0));
        }
        return response;
    }

    let mut response = next.run(request).await;
    if limiter.config.enable_headers {
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Limit", num_to_header_value(result.limit));
        headers.insert(
            "X-RateLimit-Remaining",
            num_to_header_value(result.remaining),
        );
    }
    response
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        match self {
            RateLimitError::LimitExceeded { retry_after } => {
                let mut response = crate::errors::ServiceError::RateLimitExceeded.into_response();
                // Whole seconds, rounded up.
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                response
                    .headers_mut()
                    .insert("Retry-After", num_to_header_value(secs.max(1)));
                response
            }
        }
    }
}
