//! HTTP surface: rule enforcement middleware and the decision service.

mod guard;
mod server;
mod service;

pub use guard::{
    client_identifier, enforce, guard, peer_identifier, RateLimitRejection, RuleGuard, ANONYMOUS,
    RATE_LIMIT_DETAIL,
};
pub use server::HttpServer;
pub use service::{router, ApiError, AppState, CheckRequest, CheckResponse, RuleEntry};
