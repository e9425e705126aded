use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::AppState;

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Endpoint group a request is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitBucket {
    /// Challenge, status and reset.
    Auth,
    /// Verdict submission.
    Verify,
}

impl RateLimitBucket {
    pub fn for_path(path: &str) -> Self {
        if path == "/api/auth/verify" {
            Self::Verify
        } else {
            Self::Auth
        }
    }
}

/// Rate limiting key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub ip: IpAddr,
    pub bucket: RateLimitBucket,
}

/// In-memory rate limiter state.
///
/// Uses a simple fixed window counter.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<RateLimitKey, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if the request is allowed.
    ///
    /// Returns `true` if allowed, `false` if limit exceeded.
    pub fn check(&self, key: RateLimitKey, limit: u32) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("rate limiter lock poisoned, recovering with stale state");
                poisoned.into_inner()
            }
        };
        let now = Instant::now();

        // Evict only expired windows so live limits survive cleanup.
        if state.len() > 10000 {
            state.retain(|_, (_, start)| now.duration_since(*start) <= RATE_LIMIT_WINDOW);
        }

        let (count, start) = state.entry(key).or_insert((0, now));

        if now.duration_since(*start) > RATE_LIMIT_WINDOW {
            *count = 1;
            *start = now;
            true
        } else {
            *count += 1;
            *count <= limit
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-IP rate limiting for the auth endpoints.
pub async fn rate_limit_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    // Missing ConnectInfo is a wiring error; fail closed.
    let ip = match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip(),
        None => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let bucket = RateLimitBucket::for_path(req.uri().path());
    let limit = match bucket {
        RateLimitBucket::Verify => state.config.rate_limit.verify_limit,
        RateLimitBucket::Auth => state.config.rate_limit.auth_limit,
    };

    if !state.rate_limiter.check(RateLimitKey { ip, bucket }, limit) {
        tracing::warn!(ip = %ip, bucket = ?bucket, "rate limit exceeded");
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            axum::http::HeaderValue::from_static("60"),
        );
        return Ok(response);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ip: &str, bucket: RateLimitBucket) -> RateLimitKey {
        RateLimitKey {
            ip: ip.parse().unwrap(),
            bucket,
        }
    }

    #[test]
    fn rate_limiter_allows_within_limit() {
        let limiter = RateLimiter::new();
        let k = key("127.0.0.1", RateLimitBucket::Auth);
        for _ in 0..5 {
            assert!(limiter.check(k.clone(), 5));
        }
        assert!(!limiter.check(k, 5));
    }

    #[test]
    fn buckets_and_addresses_are_counted_separately() {
        let limiter = RateLimiter::new();
        assert!(limiter.check(key("10.0.0.1", RateLimitBucket::Verify), 1));
        assert!(!limiter.check(key("10.0.0.1", RateLimitBucket::Verify), 1));
        assert!(limiter.check(key("10.0.0.1", RateLimitBucket::Auth), 1));
        assert!(limiter.check(key("10.0.0.2", RateLimitBucket::Verify), 1));
    }

    #[test]
    fn verify_path_has_its_own_bucket() {
        assert_eq!(
            RateLimitBucket::for_path("/api/auth/verify"),
            RateLimitBucket::Verify
        );
        assert_eq!(
            RateLimitBucket::for_path("/api/auth/status/s1"),
            RateLimitBucket::Auth
        );
    }
}
