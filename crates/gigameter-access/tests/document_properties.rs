//! Property tests for policy evaluation and disclosure filtering.
//!
//! - filtered documents never reference a schema they do not contain
//! - open, unfiltered policies return the document unchanged
//! - a non-empty allow-list decides alone, whatever the deny-list says
//! - include filtering keeps exactly the named top-level keys and is
//!   idempotent

use gigameter_access::disclosure::apply_include;
use gigameter_access::openapi::{DocumentDisclosureFilter, schema_ref, schema_ref_name};
use gigameter_access::policy::{
    AccessPolicyEngine, CategoryPolicy, FieldRules, PathMatcher, ResponseFilters,
};
use indexmap::IndexMap;
use proptest::prelude::*;
use serde_json::{Map, Value, json};

const SCHEMAS: &[&str] = &["User", "Post", "Tag", "Meta", "Address", "Comment"];
const PROPS: &[&str] = &["id", "name", "IP", "owner", "tags", "meta"];
const PATHS: &[&str] = &["/users", "/posts", "/posts/{id}", "/tags", "/admin"];
const PATTERNS: &[&str] = &[
    "/users",
    "/posts",
    "/posts*",
    "/posts/{postId}",
    "/tags",
    "/admin*",
];
const METHODS: &[&str] = &["GET", "POST", "DELETE", "*"];
const VERBS: &[&str] = &["GET", "POST", "DELETE", "PUT"];

// -----------------------------------------------------------------------------
// Strategies
// -----------------------------------------------------------------------------

fn schema_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec(
        (
            prop::sample::select(PROPS),
            prop::option::of(prop::sample::select(SCHEMAS)),
            any::<bool>(),
        ),
        0..5,
    )
    .prop_map(|props| {
        let mut properties = Map::new();
        for (name, target, as_array) in props {
            let node = match (target, as_array) {
                (Some(target), true) => json!({"type": "array", "items": schema_ref(target)}),
                (Some(target), false) => schema_ref(target),
                (None, _) => json!({"type": "string"}),
            };
            properties.insert(name.to_string(), node);
        }
        let required: Vec<Value> = properties.keys().cloned().map(Value::String).collect();
        json!({"type": "object", "required": required, "properties": properties})
    })
}

fn document_strategy() -> impl Strategy<Value = Value> {
    (
        prop::collection::vec(schema_strategy(), SCHEMAS.len()),
        prop::collection::vec(
            (prop::option::of(prop::sample::select(SCHEMAS)), any::<bool>()),
            PATHS.len(),
        ),
    )
        .prop_map(|(schemas, operations)| {
            let components: Map<String, Value> = SCHEMAS
                .iter()
                .map(|name| name.to_string())
                .zip(schemas)
                .collect();

            let mut paths = Map::new();
            for (path, (schema, with_post)) in PATHS.iter().zip(operations) {
                let response = match schema {
                    Some(name) => json!({"200": {"content": {"application/json": {"schema": schema_ref(name)}}}}),
                    None => json!({"204": {"description": "empty"}}),
                };
                let mut item = Map::new();
                item.insert("get".to_string(), json!({"responses": response.clone()}));
                if with_post {
                    item.insert("post".to_string(), json!({"responses": response}));
                }
                paths.insert(path.to_string(), Value::Object(item));
            }

            json!({
                "openapi": "3.0.0",
                "info": {"title": "Gigameter", "version": "1"},
                "paths": paths,
                "components": {"schemas": components}
            })
        })
}

fn rule_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(PROPS).prop_map(str::to_string),
        prop::sample::select(SCHEMAS).prop_map(str::to_string),
        (prop::sample::select(PROPS), prop::sample::select(PROPS))
            .prop_map(|(a, b)| format!("{a}.{b}")),
        (prop::sample::select(PROPS), prop::sample::select(PROPS))
            .prop_map(|(a, b)| format!("{a}[].{b}")),
    ]
}

fn endpoint_strategy() -> impl Strategy<Value = (&'static str, Vec<&'static str>)> {
    (
        prop::sample::select(PATTERNS),
        prop::collection::vec(prop::sample::select(METHODS), 1..3),
    )
}

fn policy_strategy() -> impl Strategy<Value = CategoryPolicy> {
    (
        prop::collection::vec(endpoint_strategy(), 0..3),
        prop::collection::vec(endpoint_strategy(), 0..3),
        prop::collection::vec(rule_strategy(), 0..3),
        prop::collection::vec(rule_strategy(), 0..4),
        prop::collection::vec((prop::sample::select(PATHS), rule_strategy()), 0..3),
    )
        .prop_map(|(allowed, denied, include, exclude, endpoint_rules)| {
            let mut policy = CategoryPolicy::new("fuzz");
            for (pattern, methods) in allowed {
                policy = policy.allow(pattern, methods);
            }
            for (pattern, methods) in denied {
                policy = policy.deny(pattern, methods);
            }
            let mut endpoints: IndexMap<String, FieldRules> = IndexMap::new();
            for (path, rule) in endpoint_rules {
                endpoints.entry(path.to_string()).or_default().exclude.push(rule);
            }
            policy.with_filters(ResponseFilters {
                include,
                exclude,
                endpoints,
            })
        })
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn all_schema_refs(value: &Value, out: &mut Vec<String>) {
    if let Some(name) = schema_ref_name(value) {
        out.push(name.to_string());
    }
    match value {
        Value::Object(map) => map.values().for_each(|v| all_schema_refs(v, out)),
        Value::Array(items) => items.iter().for_each(|v| all_schema_refs(v, out)),
        _ => {}
    }
}

// -----------------------------------------------------------------------------
// Properties
// -----------------------------------------------------------------------------

proptest! {
    #[test]
    fn filtered_document_has_no_dangling_refs(
        document in document_strategy(),
        policy in policy_strategy(),
    ) {
        let out = DocumentDisclosureFilter::new().filter(&policy, &document);
        let schemas = out["components"]["schemas"].as_object().cloned().unwrap_or_default();

        let mut refs = Vec::new();
        all_schema_refs(&out, &mut refs);
        for name in refs {
            prop_assert!(schemas.contains_key(&name), "dangling reference to {}", name);
        }
    }

    #[test]
    fn filtering_never_modifies_input(
        document in document_strategy(),
        policy in policy_strategy(),
    ) {
        let before = document.clone();
        let _ = DocumentDisclosureFilter::new().filter(&policy, &document);
        prop_assert_eq!(document, before);
    }

    #[test]
    fn open_policy_without_filters_is_identity(document in document_strategy()) {
        let out = DocumentDisclosureFilter::new().filter(&CategoryPolicy::new("admin"), &document);
        prop_assert_eq!(out, document);
    }

    #[test]
    fn allow_list_takes_precedence(
        allowed in prop::collection::vec(endpoint_strategy(), 1..4),
        denied in prop::collection::vec(endpoint_strategy(), 0..4),
        path in prop::sample::select(PATHS),
        method in prop::sample::select(VERBS),
    ) {
        let mut policy = CategoryPolicy::new("fuzz");
        for (pattern, methods) in &allowed {
            policy = policy.allow(*pattern, methods.iter().copied());
        }
        for (pattern, methods) in &denied {
            policy = policy.deny(*pattern, methods.iter().copied());
        }

        let matcher = PathMatcher::new();
        let expected = allowed.iter().any(|(pattern, methods)| {
            matcher.matches(path, pattern)
                && methods.iter().any(|m| *m == "*" || *m == method)
        });

        let engine = AccessPolicyEngine::new();
        prop_assert_eq!(engine.is_allowed(Some(&policy), path, method), expected);
    }

    #[test]
    fn open_policy_allows_everything(path in "/[a-z/{}*]{0,24}", method in "[A-Za-z]{1,7}") {
        let engine = AccessPolicyEngine::new();
        prop_assert!(engine.is_allowed(Some(&CategoryPolicy::new("open")), &path, &method));
    }

    #[test]
    fn include_keeps_named_keys_and_is_idempotent(
        keys in prop::collection::btree_set(prop::sample::select(PROPS), 0..6),
        named in prop::collection::vec(prop::sample::select(PROPS), 1..4),
    ) {
        let mut value = Value::Object(
            keys.iter().map(|k| (k.to_string(), json!({"id": 1, "x": 2}))).collect(),
        );
        apply_include(&mut value, &named);

        let mut expected: Vec<&str> = keys.iter().copied().filter(|k| named.contains(k)).collect();
        expected.sort_unstable();
        let mut actual: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        actual.sort_unstable();
        prop_assert_eq!(actual, expected);

        let once = value.clone();
        apply_include(&mut value, &named);
        prop_assert_eq!(value, once);
    }
}
