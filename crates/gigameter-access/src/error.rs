//! Access and disclosure error types.
//!
//! Only [`AccessError::PolicyNotFound`] and [`AccessError::AccessDenied`] are
//! ever surfaced to API callers. Configuration problems are absorbed by the
//! registry (see [`ConfigurationUnavailable`]) and malformed filter rules are
//! silently treated as no-ops.

/// Errors produced while gating a request.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The resolved category has no policy in the active snapshot.
    #[error("Category '{category}' not found")]
    PolicyNotFound {
        /// The category name that could not be resolved.
        category: String,
    },

    /// The policy does not permit the requested path and method.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Machine-checkable reason code.
        code: String,
        /// Human-readable description.
        message: String,
    },

    /// The category store could not be read.
    #[error("Store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AccessError {
    /// Creates a new `PolicyNotFound` error.
    #[must_use]
    pub fn policy_not_found(category: impl Into<String>) -> Self {
        Self::PolicyNotFound {
            category: category.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AccessDenied {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Store` error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Machine-readable code for this error.
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::PolicyNotFound { .. } => "category-not-found",
            Self::AccessDenied { code, .. } => code,
            Self::Store { .. } => "store-error",
            Self::Internal { .. } => "internal-error",
        }
    }

    /// Returns `true` if this error should be reported as a client error.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::PolicyNotFound { .. } | Self::AccessDenied { .. })
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        Self::store(err.to_string())
    }
}

/// Result type for access operations.
pub type AccessResult<T> = Result<T, AccessError>;

// =============================================================================
// Store Errors
// =============================================================================

/// Errors returned by a [`CategoryStore`](crate::storage::CategoryStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading the backing source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing source could not be decoded.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the decoding failure.
        message: String,
    },

    /// The store is temporarily unreachable.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the outage.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `Parse` error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

// =============================================================================
// Configuration Fallback
// =============================================================================

/// Why the registry fell back to the built-in policy set.
///
/// Never surfaced to callers; recorded on the snapshot and logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationUnavailable {
    /// The store returned no records.
    #[error("category store returned no records")]
    Empty,

    /// The store call exceeded the fetch timeout.
    #[error("category store did not respond within {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The store call failed.
    #[error("category store failed: {message}")]
    Store {
        /// Description of the failure.
        message: String,
    },

    /// Every record returned by the store was rejected during conversion.
    #[error("category store returned {rejected} record(s), none usable")]
    NoValidRecords {
        /// Number of rejected records.
        rejected: usize,
    },
}

impl ConfigurationUnavailable {
    /// Returns `true` if the fallback was caused by a store fault rather
    /// than an intentionally empty store.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AccessError::policy_not_found("gov").error_code(),
            "category-not-found"
        );
        assert_eq!(
            AccessError::access_denied("endpoint-not-allowed", "nope").error_code(),
            "endpoint-not-allowed"
        );
        assert_eq!(AccessError::store("down").error_code(), "store-error");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(AccessError::policy_not_found("x").is_client_error());
        assert!(AccessError::access_denied("c", "m").is_client_error());
        assert!(!AccessError::internal("boom").is_client_error());
    }

    #[test]
    fn test_policy_not_found_message() {
        let err = AccessError::policy_not_found("partner");
        assert_eq!(err.to_string(), "Category 'partner' not found");
    }

    #[test]
    fn test_store_error_converts() {
        let err: AccessError = StoreError::unavailable("connection refused").into();
        assert!(matches!(err, AccessError::Store { .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_fallback_is_failure() {
        assert!(!ConfigurationUnavailable::Empty.is_failure());
        assert!(ConfigurationUnavailable::Timeout { timeout_ms: 5 }.is_failure());
        assert!(
            ConfigurationUnavailable::NoValidRecords { rejected: 2 }.is_failure()
        );
    }
}
