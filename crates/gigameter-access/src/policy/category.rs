//! Category policy model.
//!
//! [`CategoryPolicy`] is the immutable, normalized form consumed by the
//! engine and the disclosure filters. [`CategoryPolicyRecord`] mirrors the
//! persisted configuration record and is converted with
//! [`CategoryPolicyRecord::to_policy`].
//!
//! Record fields are read leniently: a field with an unexpected type is
//! replaced by its empty default and a warning is logged, so one bad field
//! degrades to "no restriction from that field" instead of rejecting the
//! whole category.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Endpoint Rules
// =============================================================================

/// A path pattern paired with the HTTP methods it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRule {
    /// Path pattern (`/literal`, `{param}`, trailing `*`).
    pub pattern: String,
    /// Upper-cased method names; `"*"` means every method.
    pub methods: Vec<String>,
}

impl EndpointRule {
    /// Create a rule, normalizing method names to upper case.
    #[must_use]
    pub fn new<I, S>(pattern: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            pattern: pattern.into(),
            methods: methods
                .into_iter()
                .map(|m| m.as_ref().trim().to_ascii_uppercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// A rule that covers no method, so it never matches.
    #[must_use]
    pub fn unmatchable() -> Self {
        Self {
            pattern: String::new(),
            methods: Vec::new(),
        }
    }

    /// Returns `true` if this rule covers `method`.
    #[must_use]
    pub fn covers_method(&self, method: &str) -> bool {
        self.methods
            .iter()
            .any(|m| m == "*" || m.eq_ignore_ascii_case(method))
    }
}

// =============================================================================
// Response Filters
// =============================================================================

/// Include/exclude field-path lists at one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRules {
    /// Field paths to keep; everything else is dropped.
    #[serde(default)]
    pub include: Vec<String>,
    /// Field paths to drop when `include` is empty.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FieldRules {
    /// Returns `true` if neither list has entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Global field rules plus per-endpoint overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFilters {
    /// Field paths kept on every endpoint.
    #[serde(default)]
    pub include: Vec<String>,
    /// Field paths dropped on every endpoint.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Overrides keyed by the literal endpoint path they were authored for.
    #[serde(default)]
    pub endpoints: IndexMap<String, FieldRules>,
}

impl ResponseFilters {
    /// Returns `true` if no rule is configured at any scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
            && self.exclude.is_empty()
            && self.endpoints.values().all(FieldRules::is_empty)
    }
}

/// Documentation visibility for a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocVisibility {
    /// Whether a document is published for this category.
    pub visible: bool,
    /// Replacement for `info.title`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Replacement for `info.description`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// =============================================================================
// Category Policy
// =============================================================================

/// Normalized, immutable policy bound to one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPolicy {
    /// Unique category name.
    pub name: String,
    /// Whether the store flagged this category as the default.
    pub is_default: bool,
    /// Allow-list; when non-empty only matching endpoints are permitted.
    pub allowed_endpoints: Vec<EndpointRule>,
    /// Deny-list; consulted only when the allow-list is empty.
    pub denied_endpoints: Vec<EndpointRule>,
    /// Response field rules.
    pub response_filters: ResponseFilters,
    /// Country codes business logic may expose to this category.
    pub allowed_countries: Vec<String>,
    /// Documentation visibility and overrides.
    pub docs: DocVisibility,
}

impl CategoryPolicy {
    /// Create an open policy with no filters and a visible document.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_default: false,
            allowed_endpoints: Vec::new(),
            denied_endpoints: Vec::new(),
            response_filters: ResponseFilters::default(),
            allowed_countries: Vec::new(),
            docs: DocVisibility {
                visible: true,
                title: None,
                description: None,
            },
        }
    }

    /// Mark this policy as the default.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Add an allow-list entry.
    #[must_use]
    pub fn allow<I, S>(mut self, pattern: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_endpoints.push(EndpointRule::new(pattern, methods));
        self
    }

    /// Add a deny-list entry.
    #[must_use]
    pub fn deny<I, S>(mut self, pattern: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.denied_endpoints.push(EndpointRule::new(pattern, methods));
        self
    }

    /// Replace the response filters.
    #[must_use]
    pub fn with_filters(mut self, filters: ResponseFilters) -> Self {
        self.response_filters = filters;
        self
    }

    /// Replace the documentation settings.
    #[must_use]
    pub fn with_docs(mut self, docs: DocVisibility) -> Self {
        self.docs = docs;
        self
    }

    /// Returns `true` if neither an allow-list nor a deny-list is set.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.allowed_endpoints.is_empty() && self.denied_endpoints.is_empty()
    }

    /// Intersect `requested` country codes with this category's allow-list.
    ///
    /// An empty allow-list places no restriction.
    #[must_use]
    pub fn restrict_countries(&self, requested: &[String]) -> Vec<String> {
        if self.allowed_countries.is_empty() {
            return requested.to_vec();
        }
        requested
            .iter()
            .filter(|code| self.allowed_countries.contains(code))
            .cloned()
            .collect()
    }
}

// =============================================================================
// Store Records
// =============================================================================

/// Errors converting a store record into a policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// The record has no usable name.
    #[error("category name is empty")]
    EmptyName,
}

/// Endpoint entry as persisted (`{url, methods}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpointRecord {
    /// Path pattern.
    #[serde(default, deserialize_with = "lenient")]
    pub url: String,
    /// Method names in any case.
    #[serde(default, deserialize_with = "lenient")]
    pub methods: Vec<String>,
}

/// Field rules as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRulesRecord {
    /// Field paths to keep.
    #[serde(default, deserialize_with = "lenient")]
    pub include: Option<Vec<String>>,
    /// Field paths to drop.
    #[serde(default, deserialize_with = "lenient")]
    pub exclude: Option<Vec<String>>,
}

/// Response filters as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFiltersRecord {
    /// Global field paths to keep.
    #[serde(default, deserialize_with = "lenient")]
    pub include: Option<Vec<String>>,
    /// Global field paths to drop.
    #[serde(default, deserialize_with = "lenient")]
    pub exclude: Option<Vec<String>>,
    /// Per-endpoint overrides.
    #[serde(default, deserialize_with = "lenient")]
    pub endpoints: Option<IndexMap<String, FieldRulesRecord>>,
}

/// Documentation block as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwaggerRecord {
    /// Whether the document is published.
    #[serde(default, deserialize_with = "lenient")]
    pub visible: bool,
    /// Title override.
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    /// Description override.
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
}

/// A category configuration record as returned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPolicyRecord {
    /// Category name.
    pub name: String,
    /// Default flag.
    #[serde(default, deserialize_with = "lenient")]
    pub is_default: bool,
    /// Allow-list entries, `null` when unset.
    #[serde(default, rename = "allowedAPIs", deserialize_with = "lenient")]
    pub allowed_apis: Option<Vec<ApiEndpointRecord>>,
    /// Deny-list entries, `null` when unset.
    #[serde(default, rename = "notAllowedAPIs", deserialize_with = "lenient")]
    pub not_allowed_apis: Option<Vec<ApiEndpointRecord>>,
    /// Response filters.
    #[serde(default, deserialize_with = "lenient")]
    pub response_filters: Option<ResponseFiltersRecord>,
    /// Documentation settings; absent means not published.
    #[serde(default, deserialize_with = "lenient")]
    pub swagger: Option<SwaggerRecord>,
    /// Country allow-list.
    #[serde(default, deserialize_with = "lenient")]
    pub allowed_countries: Option<Vec<String>>,
}

impl CategoryPolicyRecord {
    /// Convert this record into a normalized policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::EmptyName`] if the name is blank.
    pub fn to_policy(&self) -> Result<CategoryPolicy, ConversionError> {
        let name = normalize_category_name(&self.name);
        if name.is_empty() {
            return Err(ConversionError::EmptyName);
        }

        let filters = self.response_filters.clone().unwrap_or_default();
        let endpoints = filters
            .endpoints
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(path, rules)| {
                let path = path.trim().to_string();
                if path.is_empty() {
                    return None;
                }
                Some((
                    path,
                    FieldRules {
                        include: clean_paths(rules.include),
                        exclude: clean_paths(rules.exclude),
                    },
                ))
            })
            .collect();

        let docs = match &self.swagger {
            Some(swagger) => DocVisibility {
                visible: swagger.visible,
                title: non_blank(swagger.title.as_deref()),
                description: non_blank(swagger.description.as_deref()),
            },
            None => DocVisibility::default(),
        };

        Ok(CategoryPolicy {
            name,
            is_default: self.is_default,
            allowed_endpoints: convert_allow_list(self.allowed_apis.as_deref()),
            denied_endpoints: convert_endpoints(self.not_allowed_apis.as_deref()),
            response_filters: ResponseFilters {
                include: clean_paths(filters.include),
                exclude: clean_paths(filters.exclude),
                endpoints,
            },
            allowed_countries: clean_paths(self.allowed_countries.clone()),
            docs,
        })
    }
}

impl From<&CategoryPolicy> for CategoryPolicyRecord {
    fn from(policy: &CategoryPolicy) -> Self {
        let to_records = |rules: &[EndpointRule]| -> Option<Vec<ApiEndpointRecord>> {
            if rules.is_empty() {
                return None;
            }
            Some(
                rules
                    .iter()
                    .map(|r| ApiEndpointRecord {
                        url: r.pattern.clone(),
                        methods: r.methods.clone(),
                    })
                    .collect(),
            )
        };
        let filters = &policy.response_filters;

        Self {
            name: policy.name.clone(),
            is_default: policy.is_default,
            allowed_apis: to_records(&policy.allowed_endpoints),
            not_allowed_apis: to_records(&policy.denied_endpoints),
            response_filters: Some(ResponseFiltersRecord {
                include: Some(filters.include.clone()),
                exclude: Some(filters.exclude.clone()),
                endpoints: Some(
                    filters
                        .endpoints
                        .iter()
                        .map(|(k, v)| {
                            (
                                k.clone(),
                                FieldRulesRecord {
                                    include: Some(v.include.clone()),
                                    exclude: Some(v.exclude.clone()),
                                },
                            )
                        })
                        .collect(),
                ),
            }),
            swagger: policy.docs.visible.then(|| SwaggerRecord {
                visible: true,
                title: policy.docs.title.clone(),
                description: policy.docs.description.clone(),
            }),
            allowed_countries: Some(policy.allowed_countries.clone()),
        }
    }
}

/// Canonical form of a category name: trimmed and lower-cased.
///
/// Store names, route requirements and caller categories all pass through
/// this before they are compared.
#[must_use]
pub fn normalize_category_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Like [`convert_endpoints`], but a declared allow-list whose entries are
/// all unusable becomes a rule that matches nothing instead of an empty
/// (open) list.
fn convert_allow_list(records: Option<&[ApiEndpointRecord]>) -> Vec<EndpointRule> {
    let rules = convert_endpoints(records);
    match records {
        Some(declared) if !declared.is_empty() && rules.is_empty() => {
            tracing::warn!(
                declared = declared.len(),
                "Allow-list has no usable entries; denying every endpoint"
            );
            vec![EndpointRule::unmatchable()]
        }
        _ => rules,
    }
}

fn convert_endpoints(records: Option<&[ApiEndpointRecord]>) -> Vec<EndpointRule> {
    records
        .unwrap_or_default()
        .iter()
        .filter(|r| !r.url.trim().is_empty())
        .map(|r| EndpointRule::new(r.url.trim(), &r.methods))
        .collect()
}

fn clean_paths(paths: Option<Vec<String>>) -> Vec<String> {
    paths
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Deserialize a field, replacing an ill-typed value with its default.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(T::default());
    }
    match T::deserialize(value) {
        Ok(v) => Ok(v),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring ill-typed category field");
            Ok(T::default())
        }
    }
}
