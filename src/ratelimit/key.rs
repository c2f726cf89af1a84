//! Event log key handling.

/// A key that uniquely identifies one caller's quota for one scope.
///
/// The same identifier under two scopes, or two identifiers under one
/// scope, are tracked as unrelated keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    /// The caller identifier (usually the peer address)
    pub identifier: String,
    /// The throttled operation class
    pub scope: String,
}

impl LimitKey {
    /// Create a new limit key.
    pub fn new(identifier: &str, scope: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            scope: scope.to_string(),
        }
    }
}

impl std::fmt::Display for LimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.identifier)
    }
}
