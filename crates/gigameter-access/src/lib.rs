//! # gigameter-access
//!
//! Category-based access and disclosure policy engine for the Gigameter API.
//!
//! Every caller is assigned a category (`public`, `gov`, `admin`, ...). The
//! category's policy decides:
//!
//! - whether a path and method may be invoked at all
//! - which fields of a JSON response are disclosed
//! - which operations and schemas of the OpenAPI document are published
//!
//! ## Modules
//!
//! - [`policy`] - Policy model, path matching, evaluation, registry and reload
//! - [`disclosure`] - Field-path filtering of response bodies
//! - [`openapi`] - Per-category OpenAPI document filtering
//! - [`storage`] - Category configuration store trait
//! - [`http`] - Axum response mapping and request extensions
//! - [`error`] - Error types

pub mod disclosure;
pub mod error;
pub mod http;
pub mod openapi;
pub mod policy;
pub mod storage;

pub use disclosure::{EndpointKey, ResponseDisclosureFilter};
pub use error::{AccessError, AccessResult, ConfigurationUnavailable, StoreError};
pub use http::ResolvedCategory;
pub use openapi::DocumentDisclosureFilter;
pub use policy::{
    AccessDecision, AccessPolicyEngine, CategoryChange, CategoryChangeNotifier, CategoryPolicy,
    CategoryPolicyRecord, CategoryRegistry, CategoryReloadService, CategorySnapshot,
    DEFAULT_CATEGORY, DenyReason, PathMatchMode, PathMatcher, RegistryState, ReloadConfig,
    RouteAccess, RouteTable, SnapshotSource,
};
pub use storage::{CategoryStore, StaticCategoryStore, decode_records};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::disclosure::{EndpointKey, ResponseDisclosureFilter};
    pub use crate::error::{AccessError, AccessResult};
    pub use crate::http::ResolvedCategory;
    pub use crate::openapi::DocumentDisclosureFilter;
    pub use crate::policy::{
        AccessDecision, AccessPolicyEngine, CategoryPolicy, CategoryRegistry, RouteTable,
    };
    pub use crate::storage::CategoryStore;
}
