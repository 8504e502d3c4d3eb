use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gigameter_access::policy::{RegistryState, SnapshotSource};
use gigameter_access::{CategoryPolicy, ResolvedCategory};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Success envelope shared by every JSON API route.
///
/// Response disclosure filtering applies to `data` only.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: OffsetDateTime::now_utc(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

// ---- Health ----

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.current() {
        Some(snapshot) if state.registry.state() == RegistryState::Ready => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "version": snapshot.version(),
                "source": snapshot.source().label(),
            })),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        ),
    }
}

// ---- Category configuration ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedCountries {
    pub category: String,
    pub allowed_countries: Vec<String>,
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> ApiResponse<Vec<CategoryPolicy>> {
    let snapshot = state.registry.snapshot().await;
    let policies = snapshot.policies().map(|p| p.as_ref().clone()).collect();
    ApiResponse::ok(policies)
}

pub async fn default_category(State(state): State<AppState>) -> ApiResponse<CategoryPolicy> {
    let policy = state.registry.default_policy().await;
    ApiResponse::ok(policy.as_ref().clone())
}

#[derive(Debug, Default, Deserialize)]
pub struct CountriesQuery {
    /// Comma-separated country codes to check against each category.
    pub countries: Option<String>,
}

impl CountriesQuery {
    fn requested(&self) -> Option<Vec<String>> {
        let raw = self.countries.as_deref()?;
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

/// Country allow-lists per category. With `?countries=BR,KE` each entry
/// lists only the requested codes that category may see.
pub async fn allowed_countries(
    State(state): State<AppState>,
    Query(query): Query<CountriesQuery>,
) -> ApiResponse<Vec<AllowedCountries>> {
    let requested = query.requested();
    let snapshot = state.registry.snapshot().await;
    let entries = snapshot
        .policies()
        .map(|p| AllowedCountries {
            category: p.name.clone(),
            allowed_countries: match &requested {
                Some(codes) => p.restrict_countries(codes),
                None => p.allowed_countries.clone(),
            },
        })
        .collect();
    ApiResponse::ok(entries)
}

pub async fn reload_categories(
    State(state): State<AppState>,
    Extension(caller): Extension<ResolvedCategory>,
) -> impl IntoResponse {
    tracing::info!(caller = %caller, "Category reload requested");

    let snapshot = state.registry.reload().await;
    let message = match snapshot.source() {
        SnapshotSource::Store => "Category configuration reloaded",
        SnapshotSource::Builtin { .. } => "Built-in categories in use",
    };

    ApiResponse::ok(json!({
        "snapshot": snapshot.summary(),
        "reloadStats": state.reload.stats(),
    }))
    .with_message(message)
}
