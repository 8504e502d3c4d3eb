use axum::{
    body::{Body, to_bytes},
    extract::{MatchedPath, State},
    http::{HeaderName, HeaderValue, Request, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gigameter_access::policy::normalize_category_name;
use gigameter_access::{AccessDecision, AccessError, EndpointKey, ResolvedCategory};
use serde_json::Value;
use uuid::Uuid;

use crate::server::AppState;

// =============================================================================
// Category Resolution
// =============================================================================

/// How the caller's category is determined when no upstream layer set one.
#[derive(Debug, Clone)]
pub struct CategoryResolution {
    trust_header: bool,
    header: HeaderName,
}

impl CategoryResolution {
    /// Resolution that only honors request extensions and the registry default.
    pub fn untrusted() -> Self {
        Self {
            trust_header: false,
            header: HeaderName::from_static("x-api-category"),
        }
    }

    /// Resolution that also reads the category from `header`.
    pub fn trusted_header(header: HeaderName) -> Self {
        Self {
            trust_header: true,
            header,
        }
    }

    /// Category from the request extensions, then the trusted header.
    ///
    /// Both sources go through [`normalize_category_name`]; blank header
    /// values are ignored.
    fn category_of(&self, req: &Request<Body>) -> Option<String> {
        if let Some(resolved) = req.extensions().get::<ResolvedCategory>() {
            return Some(normalize_category_name(resolved.as_str()));
        }
        if !self.trust_header {
            return None;
        }
        req.headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(normalize_category_name)
            .filter(|v| !v.is_empty())
    }
}

impl Default for CategoryResolution {
    fn default() -> Self {
        Self::untrusted()
    }
}

// =============================================================================
// Category Gate
// =============================================================================

/// Resolves the caller's category and rejects requests its policy forbids.
///
/// The resolved category is written to the request extensions as
/// [`ResolvedCategory`] for handlers and the response disclosure layer.
/// Route requirements are looked up by the matched route template; requests
/// that matched no route are evaluated against their raw path.
pub async fn category_guard(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let snapshot = state.registry.snapshot().await;

    let category = state
        .resolution
        .category_of(&req)
        .unwrap_or_else(|| snapshot.default_category().to_string());

    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let template = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string());

    let route = template
        .as_deref()
        .and_then(|t| state.routes.lookup(&method, t));
    let policy = snapshot.get(&category).map(|p| p.as_ref());

    let decision = state
        .engine
        .evaluate(policy, &category, route, &path, &method);

    if let AccessDecision::Deny(reason) = decision {
        tracing::info!(
            category = %category,
            method = %method,
            path = %path,
            code = %reason.code,
            "Request denied by category policy"
        );
        return AccessError::from(reason).into_response();
    }

    req.extensions_mut().insert(ResolvedCategory::new(category));
    next.run(req).await
}

// =============================================================================
// Response Disclosure
// =============================================================================

/// Filters the `data` member of successful JSON envelope responses.
///
/// The policy is the caller's resolved category, or the default category
/// when that category is unknown (possible on public routes). Bodies that
/// are not JSON objects with a `data` member pass through untouched.
pub async fn response_disclosure(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let category = req.extensions().get::<ResolvedCategory>().cloned();
    let path = req.uri().path().to_string();
    let template = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string());

    let response = next.run(req).await;

    if !response.status().is_success() || !is_json(&response) {
        return response;
    }

    let snapshot = state.registry.snapshot().await;
    let policy = category
        .as_ref()
        .and_then(|c| snapshot.get(c.as_str()))
        .unwrap_or_else(|| snapshot.default_policy())
        .clone();

    if policy.response_filters.is_empty() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, state.body_limit).await {
        Ok(b) => b,
        Err(e) => {
            return AccessError::internal(format!("failed to buffer response: {e}"))
                .into_response();
        }
    };

    let mut envelope: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };

    let Some(data) = envelope.get_mut("data") else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    let key = match template.as_deref() {
        Some(t) => EndpointKey::route(t, &path),
        None => EndpointKey::path(&path),
    };
    state.disclosure.filter(&policy, key, data);

    match serde_json::to_vec(&envelope) {
        Ok(filtered) => {
            parts.headers.remove(axum::http::header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(filtered))
        }
        Err(e) => AccessError::internal(format!("failed to encode response: {e}")).into_response(),
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
}

// =============================================================================
// Other Middleware
// =============================================================================

// Middleware that ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .unwrap_or_else(generate_request_id);

    // Downstream layers (tracing span) read it from the extensions
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

fn generate_request_id() -> HeaderValue {
    // A hyphenated UUID is always a valid header value.
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/v1/measurements");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_untrusted_ignores_header() {
        let resolution = CategoryResolution::untrusted();
        let req = request(&[("x-api-category", "admin")]);
        assert_eq!(resolution.category_of(&req), None);
    }

    #[test]
    fn test_trusted_header_is_normalized() {
        let resolution =
            CategoryResolution::trusted_header(HeaderName::from_static("x-api-category"));
        let req = request(&[("x-api-category", "  GOV ")]);
        assert_eq!(resolution.category_of(&req).as_deref(), Some("gov"));

        let blank = request(&[("x-api-category", "   ")]);
        assert_eq!(resolution.category_of(&blank), None);
    }

    #[test]
    fn test_extension_wins_over_header() {
        let resolution =
            CategoryResolution::trusted_header(HeaderName::from_static("x-api-category"));
        let mut req = request(&[("x-api-category", "admin")]);
        req.extensions_mut().insert(ResolvedCategory::new("Gov"));
        assert_eq!(resolution.category_of(&req).as_deref(), Some("gov"));
    }

    #[test]
    fn test_generated_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }
}
