//! Middleware that enforces a rate limit rule on a route.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::ratelimit::{Decision, RateLimitRule, RateLimiter};

/// Identifier used when the peer address is unknown.
pub const ANONYMOUS: &str = "anonymous";

/// Human-readable body of a throttled response.
pub const RATE_LIMIT_DETAIL: &str = "Rate limit exceeded. Try again later.";

/// Caller identifier for a peer address, falling back to [`ANONYMOUS`].
pub fn peer_identifier(peer: Option<SocketAddr>) -> String {
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

/// Caller identifier for a request, taken from its connection info.
pub fn client_identifier<B>(request: &axum::http::Request<B>) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    peer_identifier(peer)
}

/// A `429 Too Many Requests` response with a `Retry-After` hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRejection {
    /// Whole seconds the caller should wait, never below one
    pub retry_after: u64,
}

impl From<Decision> for RateLimitRejection {
    fn from(decision: Decision) -> Self {
        Self {
            retry_after: decision.retry_after_header(),
        }
    }
}

impl RateLimitRejection {
    /// The 429 response carrying `body` as JSON instead of the default detail.
    pub fn with_body<T: Serialize>(self, body: T) -> Response {
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after));
        response
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        self.with_body(json!({ "detail": RATE_LIMIT_DETAIL }))
    }
}

/// Middleware state binding one rule to the shared limiter.
#[derive(Clone)]
pub struct RuleGuard {
    limiter: Arc<RateLimiter>,
    rule: Arc<RateLimitRule>,
}

impl RuleGuard {
    pub fn new(limiter: Arc<RateLimiter>, rule: RateLimitRule) -> Self {
        Self {
            limiter,
            rule: Arc::new(rule),
        }
    }

    pub fn rule(&self) -> &RateLimitRule {
        &self.rule
    }
}

/// Let the request through if the caller is within the guard's rule.
pub async fn enforce(State(guard): State<RuleGuard>, request: Request, next: Next) -> Response {
    let identifier = client_identifier(&request);
    let decision = guard.limiter.check_rule(&identifier, &guard.rule);

    if !decision.is_allowed() {
        warn!(
            identifier = %identifier,
            scope = guard.rule.scope(),
            path = %request.uri().path(),
            retry_after_secs = decision.retry_after_secs(),
            "Rejecting rate limited request"
        );
        return RateLimitRejection::from(decision).into_response();
    }

    next.run(request).await
}

/// Apply `rule` to every route currently in `router`.
pub fn guard<S>(router: Router<S>, limiter: Arc<RateLimiter>, rule: RateLimitRule) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(
        RuleGuard::new(limiter, rule),
        enforce,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::post};
    use tower::ServiceExt;

    fn login_app(limiter: Arc<RateLimiter>, limit: u32) -> Router {
        let rule = RateLimitRule::new("auth:login", limit, 60).unwrap();
        guard(
            Router::new().route("/auth/login", post(|| async { "welcome" })),
            limiter,
            rule,
        )
    }

    fn login_request(peer: Option<SocketAddr>) -> Request {
        let mut request = axum::http::Request::builder()
            .method("POST")
            .uri("/auth/login")
            .body(Body::empty())
            .unwrap();
        if let Some(addr) = peer {
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_peer_identifier() {
        let addr: SocketAddr = "203.0.113.1:4242".parse().unwrap();
        assert_eq!(peer_identifier(Some(addr)), "203.0.113.1");
        assert_eq!(peer_identifier(None), ANONYMOUS);
    }

    #[test]
    fn test_client_identifier_reads_connect_info() {
        let addr: SocketAddr = "198.51.100.2:80".parse().unwrap();
        assert_eq!(client_identifier(&login_request(Some(addr))), "198.51.100.2");
        assert_eq!(client_identifier(&login_request(None)), ANONYMOUS);
    }

    #[tokio::test]
    async fn test_rejection_response() {
        let response = RateLimitRejection { retry_after: 12 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .to_lowercase()
            .contains("rate limit"));
    }

    #[tokio::test]
    async fn test_guard_blocks_when_limit_exceeded() {
        let limiter = Arc::new(RateLimiter::new());
        let app = login_app(Arc::clone(&limiter), 2);
        let peer: SocketAddr = "203.0.113.1:1234".parse().unwrap();

        for _ in 0..2 {
            let response = app.clone().oneshot(login_request(Some(peer))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(login_request(Some(peer))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));
        assert_eq!(limiter.event_count("203.0.113.1", "auth:login"), 2);
    }

    #[tokio::test]
    async fn test_guard_separates_peers() {
        let limiter = Arc::new(RateLimiter::new());
        let app = login_app(limiter, 1);

        let first: SocketAddr = "203.0.113.1:1234".parse().unwrap();
        let second: SocketAddr = "203.0.113.2:1234".parse().unwrap();

        let response = app.clone().oneshot(login_request(Some(first))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(login_request(Some(second))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(login_request(Some(first))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_guard_shares_anonymous_bucket() {
        let limiter = Arc::new(RateLimiter::new());
        let app = login_app(Arc::clone(&limiter), 1);

        let response = app.clone().oneshot(login_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(login_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limiter.event_count(ANONYMOUS, "auth:login"), 1);
    }
}
