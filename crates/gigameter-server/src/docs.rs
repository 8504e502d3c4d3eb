//! Per-category OpenAPI documents.
//!
//! Documents are filtered on every request from the pre-built source
//! document; nothing is cached.

use std::path::Path;

use axum::{
    Extension, Json,
    extract::{Path as UrlPath, State},
};
use gigameter_access::policy::{CATEGORY_NOT_PERMITTED, normalize_category_name};
use gigameter_access::{AccessError, CategoryPolicy, ResolvedCategory};
use serde_json::Value;

use crate::error::ApiError;
use crate::server::AppState;

/// Read a pre-built OpenAPI JSON document.
pub async fn load_document(path: impl AsRef<Path>) -> anyhow::Result<Value> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        anyhow::anyhow!("failed to read OpenAPI document {}: {e}", path.display())
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|e| {
        anyhow::anyhow!("failed to parse OpenAPI document {}: {e}", path.display())
    })?;
    if !document.is_object() {
        anyhow::bail!("OpenAPI document {} is not a JSON object", path.display());
    }
    Ok(document)
}

/// `GET /api/docs/openapi.json`: the default category's document.
pub async fn default_document(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let source = state
        .openapi
        .clone()
        .ok_or_else(|| ApiError::not_found("API documentation is not configured"))?;
    let policy = state.registry.default_policy().await;
    render(&state, &policy, &source)
}

/// `GET /api/{category}/openapi.json`: the caller's own category document.
pub async fn category_document(
    State(state): State<AppState>,
    UrlPath(category): UrlPath<String>,
    Extension(caller): Extension<ResolvedCategory>,
) -> Result<Json<Value>, ApiError> {
    let source = state
        .openapi
        .clone()
        .ok_or_else(|| ApiError::not_found("API documentation is not configured"))?;

    let requested = normalize_category_name(&category);
    if caller.as_str() != requested {
        tracing::info!(
            caller = %caller,
            requested = %requested,
            "Documentation request for another category"
        );
        return Err(AccessError::access_denied(
            CATEGORY_NOT_PERMITTED,
            format!("Documentation for category '{requested}' is not available to this caller"),
        )
        .into());
    }

    let policy = state
        .registry
        .get_policy(&requested)
        .await
        .ok_or_else(|| ApiError::not_found(format!("No documentation for category '{requested}'")))?;
    render(&state, &policy, &source)
}

fn render(
    state: &AppState,
    policy: &CategoryPolicy,
    source: &Value,
) -> Result<Json<Value>, ApiError> {
    if !policy.docs.visible {
        return Err(ApiError::not_found(format!(
            "No documentation for category '{}'",
            policy.name
        )));
    }
    Ok(Json(state.documents.filter(policy, source)))
}
