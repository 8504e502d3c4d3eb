//! Response body disclosure.
//!
//! Trims a JSON response body to the fields a category may see, combining
//! the policy's global rules with the override authored for the endpoint.

use serde_json::Value;

use crate::disclosure::field_path::{FilterMode, apply};
use crate::policy::category::{CategoryPolicy, FieldRules};

/// Key used to look up a per-endpoint override.
///
/// The route template (`/api/v1/schools/{id}`) is tried first. The raw
/// request path is only consulted when the template has no override.
#[derive(Debug, Clone, Copy)]
pub struct EndpointKey<'a> {
    /// Router path template, when the request matched a route.
    pub template: Option<&'a str>,
    /// Concrete request path.
    pub path: &'a str,
}

impl<'a> EndpointKey<'a> {
    /// Key for a concrete path with no known template.
    #[must_use]
    pub fn path(path: &'a str) -> Self {
        Self {
            template: None,
            path,
        }
    }

    /// Key for a matched route.
    #[must_use]
    pub fn route(template: &'a str, path: &'a str) -> Self {
        Self {
            template: Some(template),
            path,
        }
    }
}

/// Stateless response filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDisclosureFilter;

impl ResponseDisclosureFilter {
    /// Create a filter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Global rules merged with the endpoint override, order kept and
    /// duplicates dropped.
    #[must_use]
    pub fn effective_rules(&self, policy: &CategoryPolicy, key: EndpointKey<'_>) -> FieldRules {
        let filters = &policy.response_filters;
        let endpoint = key
            .template
            .and_then(|t| filters.endpoints.get(t))
            .or_else(|| filters.endpoints.get(key.path));

        let mut rules = FieldRules {
            include: filters.include.clone(),
            exclude: filters.exclude.clone(),
        };
        if let Some(endpoint) = endpoint {
            merge_unique(&mut rules.include, &endpoint.include);
            merge_unique(&mut rules.exclude, &endpoint.exclude);
        }
        rules
    }

    /// Filter `body` in place.
    ///
    /// A non-empty include list wins over the exclude list. Arrays are
    /// filtered element by element, scalars and `null` pass through.
    pub fn filter(&self, policy: &CategoryPolicy, key: EndpointKey<'_>, body: &mut Value) {
        if body.is_null() {
            return;
        }
        let rules = self.effective_rules(policy, key);
        if !rules.include.is_empty() {
            apply(body, &rules.include, FilterMode::Include);
        } else if !rules.exclude.is_empty() {
            apply(body, &rules.exclude, FilterMode::Exclude);
        }
    }

    /// Filter a copy of `body`, leaving the input untouched.
    #[must_use]
    pub fn filtered(&self, policy: &CategoryPolicy, key: EndpointKey<'_>, body: &Value) -> Value {
        let mut out = body.clone();
        self.filter(policy, key, &mut out);
        out
    }
}

fn merge_unique(target: &mut Vec<String>, extra: &[String]) {
    for path in extra {
        if !target.contains(path) {
            target.push(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::category::ResponseFilters;
    use crate::policy::defaults::builtin_policies;
    use assert_json_diff::assert_json_eq;
    use indexmap::IndexMap;
    use serde_json::json;

    fn policy(include: &[&str], exclude: &[&str], endpoints: &[(&str, FieldRules)]) -> CategoryPolicy {
        CategoryPolicy::new("test").with_filters(ResponseFilters {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            endpoints: endpoints
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<IndexMap<_, _>>(),
        })
    }

    fn rules(include: &[&str], exclude: &[&str]) -> FieldRules {
        FieldRules {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_global_exclude() {
        let p = policy(&[], &["password"], &[]);
        let out = ResponseDisclosureFilter::new().filtered(
            &p,
            EndpointKey::path("/users"),
            &json!({"id": 1, "name": "x", "password": "y"}),
        );
        assert_json_eq!(out, json!({"id": 1, "name": "x"}));
    }

    #[test]
    fn test_global_include_nested() {
        let p = policy(&["id", "user.id", "user.name"], &[], &[]);
        let out = ResponseDisclosureFilter::new().filtered(
            &p,
            EndpointKey::path("/users"),
            &json!({"id": 1, "user": {"id": 10, "name": "n", "role": "admin"}}),
        );
        assert_json_eq!(out, json!({"id": 1, "user": {"id": 10, "name": "n"}}));
    }

    #[test]
    fn test_include_wins_over_exclude() {
        let p = policy(&["id"], &["id"], &[]);
        let out = ResponseDisclosureFilter::new().filtered(
            &p,
            EndpointKey::path("/x"),
            &json!({"id": 1, "other": 2}),
        );
        assert_json_eq!(out, json!({"id": 1}));
    }

    #[test]
    fn test_endpoint_override_merges_with_global() {
        let p = policy(&[], &["IP"], &[("/api/v1/schools", rules(&[], &["giga_id"]))]);
        let filter = ResponseDisclosureFilter::new();
        let body = json!([{"id": 1, "IP": "a", "giga_id": "g"}]);

        let out = filter.filtered(&p, EndpointKey::path("/api/v1/schools"), &body);
        assert_json_eq!(out, json!([{"id": 1}]));

        let out = filter.filtered(&p, EndpointKey::path("/api/v1/other"), &body);
        assert_json_eq!(out, json!([{"id": 1, "giga_id": "g"}]));
    }

    #[test]
    fn test_override_key_is_not_a_pattern() {
        let p = policy(&[], &[], &[("/api/v1/schools*", rules(&[], &["id"]))]);
        let out = ResponseDisclosureFilter::new().filtered(
            &p,
            EndpointKey::path("/api/v1/schools"),
            &json!({"id": 1}),
        );
        assert_json_eq!(out, json!({"id": 1}));
    }

    #[test]
    fn test_template_key_preferred_over_path() {
        let p = policy(
            &[],
            &[],
            &[
                ("/schools/{id}", rules(&[], &["a"])),
                ("/schools/7", rules(&[], &["b"])),
            ],
        );
        let filter = ResponseDisclosureFilter::new();
        let body = json!({"a": 1, "b": 2});

        let out = filter.filtered(&p, EndpointKey::route("/schools/{id}", "/schools/7"), &body);
        assert_json_eq!(out, json!({"b": 2}));

        let out = filter.filtered(&p, EndpointKey::route("/schools/{sid}", "/schools/7"), &body);
        assert_json_eq!(out, json!({"a": 1}));
    }

    #[test]
    fn test_effective_rules_deduplicated() {
        let p = policy(&[], &["IP", "x"], &[("/e", rules(&[], &["x", "y"]))]);
        let effective = ResponseDisclosureFilter::new().effective_rules(&p, EndpointKey::path("/e"));
        assert_eq!(effective.exclude, vec!["IP", "x", "y"]);
    }

    #[test]
    fn test_null_and_scalars_unchanged() {
        let p = policy(&["id"], &[], &[]);
        let filter = ResponseDisclosureFilter::new();
        for body in [Value::Null, json!(42), json!("text")] {
            assert_eq!(filter.filtered(&p, EndpointKey::path("/x"), &body), body);
        }
    }

    #[test]
    fn test_builtin_public_category() {
        let public = builtin_policies().remove(0);
        let out = ResponseDisclosureFilter::new().filtered(
            &public,
            EndpointKey::path("/api/v1/dailycheckapp_schools"),
            &json!([{"id": 1, "IP": "x", "giga_id_school": "g", "country_code": "BR"}]),
        );
        assert_json_eq!(out, json!([{"id": 1, "country_code": "BR"}]));
    }
}
