//! Rate limit rules and the registry that names them.
//!
//! Rules are fixed at process start. The registry ships with the built-in
//! rules for authentication and spot writes, and can layer additional or
//! overriding rules from a YAML file on top of them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, ThrottleError};

/// Registry name of the login rule.
pub const AUTH_LOGIN: &str = "auth_login";
/// Registry name of the registration rule.
pub const AUTH_REGISTER: &str = "auth_register";
/// Registry name of the spot write rule.
pub const SKATE_SPOT_WRITE: &str = "skate_spot_write";

/// An immutable throttling rule: at most `limit` events per `window_seconds`
/// for each caller within `scope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct RateLimitRule {
    scope: String,
    limit: u32,
    window_seconds: u64,
}

/// Unvalidated rule as it appears in configuration files.
#[derive(Debug, Deserialize)]
struct RawRule {
    scope: String,
    limit: u32,
    window_seconds: u64,
}

impl TryFrom<RawRule> for RateLimitRule {
    type Error = ThrottleError;

    fn try_from(raw: RawRule) -> Result<Self> {
        RateLimitRule::new(raw.scope, raw.limit, raw.window_seconds)
    }
}

impl RateLimitRule {
    /// Create a rule, rejecting values the limiter would treat degenerately.
    pub fn new(scope: impl Into<String>, limit: u32, window_seconds: u64) -> Result<Self> {
        let scope = scope.into();
        let invalid = |reason: &str| ThrottleError::InvalidRule {
            scope: scope.clone(),
            reason: reason.to_string(),
        };

        if scope.trim().is_empty() {
            return Err(invalid("scope must not be empty"));
        }
        if limit == 0 {
            return Err(invalid("limit must be positive"));
        }
        if window_seconds == 0 {
            return Err(invalid("window_seconds must be positive"));
        }

        Ok(Self {
            scope,
            limit,
            window_seconds,
        })
    }

    /// Failed login attempts: 5 per minute.
    pub fn auth_login() -> Self {
        Self::builtin("auth:login", 5, 60)
    }

    /// Account registrations: 5 per minute.
    pub fn auth_register() -> Self {
        Self::builtin("auth:register", 5, 60)
    }

    /// Skate spot create/update/delete: 50 per minute.
    pub fn skate_spot_write() -> Self {
        Self::builtin("skate-spots:write", 50, 60)
    }

    fn builtin(scope: &str, limit: u32, window_seconds: u64) -> Self {
        Self {
            scope: scope.to_string(),
            limit,
            window_seconds,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// The sliding window length.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Named rules available to the request-handling layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleRegistry {
    #[serde(default)]
    rules: BTreeMap<String, RateLimitRule>,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in rules.
    pub fn builtin() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(AUTH_LOGIN.to_string(), RateLimitRule::auth_login());
        rules.insert(AUTH_REGISTER.to_string(), RateLimitRule::auth_register());
        rules.insert(SKATE_SPOT_WRITE.to_string(), RateLimitRule::skate_spot_write());
        Self { rules }
    }

    /// Load rules from a YAML file and layer them over the built-ins.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse rules from YAML and layer them over the built-ins.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let loaded: RuleRegistry = serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse rate limit rules: {}", e)))?;

        let mut registry = Self::builtin();
        for (name, rule) in loaded.rules {
            registry.rules.insert(name, rule);
        }
        Ok(registry)
    }

    /// Register a rule under `name`, replacing any previous rule of that name.
    pub fn insert(&mut self, name: impl Into<String>, rule: RateLimitRule) -> Option<RateLimitRule> {
        self.rules.insert(name.into(), rule)
    }

    /// Look up a rule by name.
    pub fn get(&self, name: &str) -> Option<&RateLimitRule> {
        self.rules.get(name)
    }

    /// Look up a rule by name, failing for unknown names.
    pub fn require(&self, name: &str) -> Result<&RateLimitRule> {
        self.get(name)
            .ok_or_else(|| ThrottleError::UnknownRule(name.to_string()))
    }

    /// Iterate over `(name, rule)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RateLimitRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
