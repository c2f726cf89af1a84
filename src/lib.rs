//! Skate Spots throttling - in-process sliding-window rate limiting
//!
//! This crate implements the rate limiter that guards the skate spots
//! backend's authentication and write endpoints. A single `RateLimiter`
//! is created at startup and shared with the request-handling layer, which
//! asks it whether each throttled request may proceed and turns denials into
//! `429 Too Many Requests` responses with a `Retry-After` hint.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod ratelimit;
