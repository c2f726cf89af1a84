//! Rate limit decision endpoints.

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::guard::{peer_identifier, RateLimitRejection, RATE_LIMIT_DETAIL};
use crate::ratelimit::{RateLimiter, RuleRegistry};

/// Shared state for the decision endpoints.
#[derive(Clone)]
pub struct AppState {
    limiter: Arc<RateLimiter>,
    rules: Arc<RuleRegistry>,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, rules: Arc<RuleRegistry>) -> Self {
        Self { limiter, rules }
    }
}

/// Body of `POST /v1/check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Registry name of the rule to apply
    pub rule: String,
    /// Caller to charge; the peer address when absent
    #[serde(default)]
    pub identifier: Option<String>,
}

/// Body of `POST /v1/check`, returned with 200 when allowed and 429 when not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub scope: String,
    /// Zero when allowed
    pub retry_after_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One entry of `GET /v1/rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEntry {
    pub name: String,
    pub scope: String,
    pub limit: u32,
    pub window_seconds: u64,
}

/// Errors returned by the decision endpoints.
#[derive(Debug)]
pub enum ApiError {
    InvalidArgument(String),
    UnknownRule(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidArgument(detail) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::UnknownRule(name) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": format!("unknown rule: {}", name) })),
            )
                .into_response(),
        }
    }
}

/// Build the router for the decision service.
///
/// `POST /admin/reset` is only mounted when `enable_reset` is set.
pub fn router(state: AppState, enable_reset: bool) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/rules", get(list_rules))
        .route("/v1/check", post(check));

    if enable_reset {
        warn!("Administrative reset endpoint enabled");
        router = router.route("/admin/reset", post(admin_reset));
    }

    router.with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_rules(State(state): State<AppState>) -> Json<Vec<RuleEntry>> {
    let rules = state
        .rules
        .iter()
        .map(|(name, rule)| RuleEntry {
            name: name.to_string(),
            scope: rule.scope().to_string(),
            limit: rule.limit(),
            window_seconds: rule.window_seconds(),
        })
        .collect();
    Json(rules)
}

/// Charge one event against a named rule.
#[instrument(skip_all, fields(rule = %request.rule))]
async fn check(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<CheckRequest>,
) -> Result<Response, ApiError> {
    if request.rule.is_empty() {
        warn!("Received check request with empty rule name");
        return Err(ApiError::InvalidArgument("rule is required".to_string()));
    }

    let rule = state
        .rules
        .get(&request.rule)
        .ok_or_else(|| ApiError::UnknownRule(request.rule.clone()))?;

    let identifier = match request.identifier {
        Some(ref id) if !id.is_empty() => id.clone(),
        _ => peer_identifier(peer.map(|ConnectInfo(addr)| addr)),
    };

    debug!(identifier = %identifier, scope = rule.scope(), "Processing check request");

    let decision = state.limiter.check_rule(&identifier, rule);

    info!(
        identifier = %identifier,
        scope = rule.scope(),
        allowed = decision.is_allowed(),
        "Rate limit decision made"
    );

    let body = CheckResponse {
        allowed: decision.is_allowed(),
        scope: rule.scope().to_string(),
        retry_after_seconds: decision.retry_after_secs(),
        detail: None,
    };

    if !decision.is_allowed() {
        let body = CheckResponse {
            detail: Some(RATE_LIMIT_DETAIL.to_string()),
            ..body
        };
        return Ok(RateLimitRejection::from(decision).with_body(body));
    }

    Ok(Json(body).into_response())
}

async fn admin_reset(State(state): State<AppState>) -> StatusCode {
    state.limiter.reset();
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{RateLimitRule, AUTH_LOGIN};
    use axum::{body::Body, http::header, http::Request};
    use tower::ServiceExt;

    fn app(enable_reset: bool) -> (Router, Arc<RateLimiter>) {
        let limiter = Arc::new(RateLimiter::new());
        let mut rules = RuleRegistry::builtin();
        rules.insert("tiny", RateLimitRule::new("tiny", 1, 60).unwrap());
        let state = AppState::new(Arc::clone(&limiter), Arc::new(rules));
        (router(state, enable_reset), limiter)
    }

    fn check_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/check")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let (app, _) = app(false);
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_rules() {
        let (app, _) = app(false);
        let response = app
            .oneshot(Request::get("/v1/rules").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let rules = body.as_array().unwrap();
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[0]["name"], AUTH_LOGIN);
        assert_eq!(rules[0]["scope"], "auth:login");
        assert_eq!(rules[0]["limit"], 5);
    }

    #[tokio::test]
    async fn test_login_scenario_over_http() {
        let (app, _) = app(true);
        let body = json!({ "rule": AUTH_LOGIN, "identifier": "203.0.113.1" });

        for _ in 0..5 {
            let response = app.clone().oneshot(check_request(body.clone())).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let decision = json_body(response).await;
            assert_eq!(decision["allowed"], true);
            assert_eq!(decision["retry_after_seconds"], 0.0);
            assert!(decision.get("detail").is_none());
        }

        let response = app.clone().oneshot(check_request(body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after >= 1);

        let reset = app
            .clone()
            .oneshot(Request::post("/admin/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(reset.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(check_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_denied_check_reports_decision() {
        let (app, limiter) = app(false);
        let body = json!({ "rule": "tiny", "identifier": "203.0.113.7" });

        let response = app.clone().oneshot(check_request(body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(check_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));

        let decision = json_body(response).await;
        assert_eq!(decision["allowed"], false);
        assert_eq!(decision["scope"], "tiny");
        let seconds = decision["retry_after_seconds"].as_f64().unwrap();
        assert!(seconds > 0.0 && seconds <= 60.0);
        assert_eq!(decision["detail"], RATE_LIMIT_DETAIL);
        assert_eq!(limiter.event_count("203.0.113.7", "tiny"), 1);
    }

    #[tokio::test]
    async fn test_check_defaults_to_peer_identifier() {
        let (app, limiter) = app(false);
        let mut request = check_request(json!({ "rule": "tiny" }));
        let peer: SocketAddr = "198.51.100.9:5555".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.event_count("198.51.100.9", "tiny"), 1);
    }

    #[tokio::test]
    async fn test_unknown_rule_rejected() {
        let (app, _) = app(false);
        let response = app
            .oneshot(check_request(json!({ "rule": "nope" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_rule_rejected() {
        let (app, _) = app(false);
        let response = app
            .oneshot(check_request(json!({ "rule": "" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reset_not_mounted_by_default() {
        let (app, _) = app(false);
        let response = app
            .oneshot(Request::post("/admin/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
