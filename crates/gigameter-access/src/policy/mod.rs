//! Category access policies.
//!
//! - [`category`]: the policy model and the store record format
//! - [`defaults`]: the built-in category set
//! - [`matcher`]: path pattern matching
//! - [`engine`]: allow/deny evaluation
//! - [`routes`]: statically declared public and restricted routes
//! - [`registry`]: the active, versioned policy set
//! - [`reload`]: debounced hot-reload of the registry
//!
//! # Gating a request
//!
//! ```ignore
//! use gigameter_access::policy::{AccessPolicyEngine, CategoryRegistry};
//!
//! let snapshot = registry.snapshot().await;
//! let policy = snapshot.get("gov");
//! let decision = engine.evaluate(policy.map(|p| p.as_ref()), "gov", None, "/admin", "GET");
//! decision.into_result()?;
//! ```

pub mod category;
pub mod defaults;
pub mod engine;
pub mod matcher;
pub mod registry;
pub mod reload;
pub mod routes;

pub use category::{
    ApiEndpointRecord, CategoryPolicy, CategoryPolicyRecord, ConversionError, DocVisibility,
    EndpointRule, FieldRules, FieldRulesRecord, ResponseFilters, ResponseFiltersRecord,
    SwaggerRecord, normalize_category_name,
};
pub use defaults::{DEFAULT_CATEGORY, builtin_policies};
pub use engine::{
    AccessDecision, AccessPolicyEngine, CATEGORY_NOT_FOUND, CATEGORY_NOT_PERMITTED, DenyReason,
    ENDPOINT_NOT_ALLOWED,
};
pub use matcher::{PathMatchMode, PathMatcher};
pub use registry::{
    CategoryRegistry, CategorySnapshot, DEFAULT_FETCH_TIMEOUT, RegistryState, SnapshotSource,
    SnapshotSummary,
};
pub use reload::{
    CategoryChange, CategoryChangeNotifier, CategoryReloadService, ReloadConfig, ReloadStats,
};
pub use routes::{RouteAccess, RouteTable};
