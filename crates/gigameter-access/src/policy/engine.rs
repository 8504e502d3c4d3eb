//! Access policy engine.
//!
//! Decides whether a category may invoke a path and method. The same
//! [`AccessPolicyEngine::is_allowed_with`] entry point serves both the
//! request gate ([`PathMatchMode::Request`]) and documentation filtering
//! ([`PathMatchMode::Template`]), so the two can never disagree on the
//! allow/deny precedence.
//!
//! # Example
//!
//! ```ignore
//! use gigameter_access::policy::{AccessPolicyEngine, RouteTable};
//!
//! let engine = AccessPolicyEngine::new();
//! let decision = engine.evaluate(policy.as_deref(), "gov", routes.lookup("GET", route), path, "GET");
//! if decision.is_allowed() {
//!     // run the handler
//! }
//! ```

use serde::Serialize;

use crate::error::AccessError;
use crate::policy::category::{CategoryPolicy, EndpointRule};
use crate::policy::matcher::{PathMatchMode, PathMatcher};
use crate::policy::routes::RouteAccess;

// =============================================================================
// Access Decision
// =============================================================================

/// Result of evaluating a request against a category policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The request may proceed.
    Allow,
    /// The request is rejected.
    Deny(DenyReason),
}

impl AccessDecision {
    /// Returns `true` if access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Get the deny reason if access was denied.
    #[must_use]
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Deny(reason) => Some(reason),
            Self::Allow => None,
        }
    }

    /// Convert into a `Result`, mapping denials to [`AccessError`].
    ///
    /// # Errors
    ///
    /// Returns the denial as `PolicyNotFound` or `AccessDenied`.
    pub fn into_result(self) -> Result<(), AccessError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(reason.into()),
        }
    }
}

// =============================================================================
// Deny Reason
// =============================================================================

/// Reason code for a category that has no policy.
pub const CATEGORY_NOT_FOUND: &str = "category-not-found";
/// Reason code for a route restricted to other categories.
pub const CATEGORY_NOT_PERMITTED: &str = "category-not-permitted";
/// Reason code for a path and method the policy does not permit.
pub const ENDPOINT_NOT_ALLOWED: &str = "endpoint-not-allowed";

/// Reason for access denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenyReason {
    /// Error code for programmatic handling.
    pub code: String,

    /// Human-readable error message.
    pub message: String,

    /// Category the decision was made for.
    pub category: String,
}

impl DenyReason {
    /// The category has no policy in the active set.
    #[must_use]
    pub fn category_not_found(category: &str) -> Self {
        Self {
            code: CATEGORY_NOT_FOUND.to_string(),
            message: format!("Category '{category}' not found"),
            category: category.to_string(),
        }
    }

    /// The route lists other categories.
    #[must_use]
    pub fn category_not_permitted(category: &str, required: &[String]) -> Self {
        Self {
            code: CATEGORY_NOT_PERMITTED.to_string(),
            message: format!(
                "This endpoint requires one of these categories: {}",
                required.join(", ")
            ),
            category: category.to_string(),
        }
    }

    /// The policy's endpoint rules reject the path and method.
    #[must_use]
    pub fn endpoint_not_allowed(category: &str, method: &str, path: &str) -> Self {
        Self {
            code: ENDPOINT_NOT_ALLOWED.to_string(),
            message: format!("You do not have access to {method} {path}"),
            category: category.to_string(),
        }
    }
}

impl From<DenyReason> for AccessError {
    fn from(reason: DenyReason) -> Self {
        if reason.code == CATEGORY_NOT_FOUND {
            AccessError::policy_not_found(reason.category)
        } else {
            AccessError::access_denied(reason.code, reason.message)
        }
    }
}

// =============================================================================
// Access Policy Engine
// =============================================================================

/// Stateless evaluator of category policies.
#[derive(Debug, Default)]
pub struct AccessPolicyEngine {
    matcher: PathMatcher,
}

impl AccessPolicyEngine {
    /// Create a new engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            matcher: PathMatcher::new(),
        }
    }

    /// The path matcher used by this engine.
    #[must_use]
    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Whether `policy` permits `method path` for a concrete request path.
    ///
    /// An absent policy is never allowed.
    #[must_use]
    pub fn is_allowed(&self, policy: Option<&CategoryPolicy>, path: &str, method: &str) -> bool {
        self.is_allowed_with(policy, path, method, PathMatchMode::Request)
    }

    /// Whether `policy` permits `method path`, matching in `mode`.
    ///
    /// - An absent policy is never allowed.
    /// - A non-empty allow-list permits exactly its matches; the deny-list is
    ///   ignored.
    /// - Otherwise a non-empty deny-list rejects its matches.
    /// - Otherwise everything is permitted.
    #[must_use]
    pub fn is_allowed_with(
        &self,
        policy: Option<&CategoryPolicy>,
        path: &str,
        method: &str,
        mode: PathMatchMode,
    ) -> bool {
        let Some(policy) = policy else {
            return false;
        };

        if !policy.allowed_endpoints.is_empty() {
            return self.any_rule_matches(&policy.allowed_endpoints, path, method, mode);
        }

        if !policy.denied_endpoints.is_empty() {
            return !self.any_rule_matches(&policy.denied_endpoints, path, method, mode);
        }

        true
    }

    /// Full request-gate decision.
    ///
    /// Order of checks:
    /// 1. public routes are allowed without consulting any policy
    /// 2. an absent policy is denied as `category-not-found`
    /// 3. a route with required categories allows exactly those categories
    ///    and skips the endpoint rules entirely
    /// 4. otherwise the policy's endpoint rules decide
    #[must_use]
    pub fn evaluate(
        &self,
        policy: Option<&CategoryPolicy>,
        category: &str,
        route: Option<&RouteAccess>,
        path: &str,
        method: &str,
    ) -> AccessDecision {
        if route.is_some_and(|r| r.public) {
            return AccessDecision::Allow;
        }

        let Some(policy) = policy else {
            return AccessDecision::Deny(DenyReason::category_not_found(category));
        };

        if let Some(route) = route.filter(|r| !r.required_categories.is_empty()) {
            return if route.permits_category(&policy.name) {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny(DenyReason::category_not_permitted(
                    &policy.name,
                    &route.required_categories,
                ))
            };
        }

        if self.is_allowed(Some(policy), path, method) {
            AccessDecision::Allow
        } else {
            tracing::debug!(
                category = %policy.name,
                method,
                path,
                "Endpoint rejected by category policy"
            );
            AccessDecision::Deny(DenyReason::endpoint_not_allowed(&policy.name, method, path))
        }
    }

    fn any_rule_matches(
        &self,
        rules: &[EndpointRule],
        path: &str,
        method: &str,
        mode: PathMatchMode,
    ) -> bool {
        rules.iter().any(|rule| {
            rule.covers_method(method) && self.matcher.matches_with(path, &rule.pattern, mode)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
