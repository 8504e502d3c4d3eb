//! Per-category OpenAPI document filtering.
//!
//! [`DocumentDisclosureFilter::filter`] produces an independent copy of a
//! document trimmed to what one category may see:
//!
//! 1. invisible documentation yields empty `paths` and schemas
//! 2. `info.title` and `info.description` take the category's overrides
//! 3. open policies get the full document
//! 4. operations the category may not call are dropped, then empty paths
//! 5. only schemas reachable from the surviving operations are kept
//! 6. kept schemas get the category's field rules applied to `properties`
//! 7. globally excluded and no longer reachable schemas are removed until
//!    nothing changes, and leftover references to removed schemas are
//!    scrubbed so the output never points at a missing schema

use std::collections::HashSet;

use indexmap::IndexSet;
use serde_json::{Map, Value};

use crate::openapi::node::schema_ref_name;
use crate::openapi::schema_filter::{filter_schema_properties, remove_required};
use crate::openapi::schema_map::{EndpointSchemaMap, HTTP_METHODS, schema_closure};
use crate::policy::category::{CategoryPolicy, FieldRules};
use crate::policy::engine::AccessPolicyEngine;
use crate::policy::matcher::PathMatchMode;

/// Stateless filter producing per-category documents.
#[derive(Debug, Default)]
pub struct DocumentDisclosureFilter {
    engine: AccessPolicyEngine,
}

impl DocumentDisclosureFilter {
    /// Create a filter with its own engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            engine: AccessPolicyEngine::new(),
        }
    }

    /// Create a filter sharing an engine's decisions.
    #[must_use]
    pub fn with_engine(engine: AccessPolicyEngine) -> Self {
        Self { engine }
    }

    /// Filter `document` for `policy`. The input is never modified.
    #[must_use]
    pub fn filter(&self, policy: &CategoryPolicy, document: &Value) -> Value {
        let mut doc = document.clone();

        if !policy.docs.visible {
            hide_everything(&mut doc);
            return doc;
        }

        apply_info_overrides(&mut doc, policy);
        if policy.is_open() {
            return doc;
        }

        let endpoint_map = match doc.get_mut("paths").and_then(Value::as_object_mut) {
            Some(paths) => {
                self.filter_operations(policy, paths);
                EndpointSchemaMap::build(paths)
            }
            None => EndpointSchemaMap::default(),
        };

        let Some(schemas) = doc
            .pointer_mut("/components/schemas")
            .and_then(Value::as_object_mut)
        else {
            return doc;
        };

        let roots = endpoint_map.all_schemas();
        let excluded: HashSet<&str> = policy
            .response_filters
            .exclude
            .iter()
            .map(String::as_str)
            .collect();

        let reachable = schema_closure(schemas, &roots, &HashSet::new());
        schemas.retain(|name, _| reachable.contains(name));

        self.filter_schema_properties(policy, &endpoint_map, schemas);
        prune_schemas(schemas, &roots, &excluded);

        let known: HashSet<String> = schemas.keys().cloned().collect();
        for schema in schemas.values_mut() {
            scrub_child(schema, &known);
        }
        if let Some(paths) = doc.get_mut("paths") {
            scrub_dangling(paths, &known);
        }

        doc
    }

    /// Drop operations `policy` forbids, then paths left without operations.
    fn filter_operations(&self, policy: &CategoryPolicy, paths: &mut Map<String, Value>) {
        paths.retain(|path, item| {
            let Some(item) = item.as_object_mut() else {
                return false;
            };
            item.retain(|key, _| {
                !is_method(key)
                    || self.engine.is_allowed_with(
                        Some(policy),
                        path,
                        key,
                        PathMatchMode::Template,
                    )
            });
            let keep = item.keys().any(|key| is_method(key));
            if !keep {
                tracing::debug!(category = %policy.name, path = %path, "Hiding documented path");
            }
            keep
        });
    }

    /// Apply global and per-endpoint field rules to each kept schema.
    fn filter_schema_properties(
        &self,
        policy: &CategoryPolicy,
        endpoint_map: &EndpointSchemaMap,
        schemas: &mut Map<String, Value>,
    ) {
        let snapshot = schemas.clone();
        for (name, schema) in schemas.iter_mut() {
            let rules = schema_rules(policy, endpoint_map, name);
            if filter_schema_properties(schema, &rules, &snapshot) {
                tracing::debug!(category = %policy.name, schema = %name, "Filtered schema properties");
            }
        }
    }
}

fn is_method(key: &str) -> bool {
    HTTP_METHODS.contains(&key)
}

fn hide_everything(doc: &mut Value) {
    let Some(obj) = doc.as_object_mut() else {
        return;
    };
    obj.insert("paths".to_string(), Value::Object(Map::new()));
    if let Some(Value::Object(schemas)) = doc.pointer_mut("/components/schemas") {
        schemas.clear();
    }
}

fn apply_info_overrides(doc: &mut Value, policy: &CategoryPolicy) {
    let overrides = [
        ("title", policy.docs.title.as_ref()),
        ("description", policy.docs.description.as_ref()),
    ];
    if overrides.iter().all(|(_, value)| value.is_none()) {
        return;
    }
    let Some(root) = doc.as_object_mut() else {
        return;
    };
    let info = root
        .entry("info")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(info) = info.as_object_mut() else {
        return;
    };
    for (key, value) in overrides {
        if let Some(value) = value {
            info.insert(key.to_string(), Value::String(value.clone()));
        }
    }
}

/// Global rules plus the overrides of every path using `schema`.
fn schema_rules(policy: &CategoryPolicy, endpoint_map: &EndpointSchemaMap, schema: &str) -> FieldRules {
    let filters = &policy.response_filters;
    let mut include: IndexSet<String> = filters.include.iter().cloned().collect();
    let mut exclude: IndexSet<String> = filters.exclude.iter().cloned().collect();
    for path in endpoint_map.paths_using(schema) {
        if let Some(endpoint) = filters.endpoints.get(path) {
            include.extend(endpoint.include.iter().cloned());
            exclude.extend(endpoint.exclude.iter().cloned());
        }
    }
    FieldRules {
        include: include.into_iter().collect(),
        exclude: exclude.into_iter().collect(),
    }
}

/// Remove excluded and unreachable schemas until none is removed.
fn prune_schemas(schemas: &mut Map<String, Value>, roots: &IndexSet<String>, excluded: &HashSet<&str>) {
    loop {
        let reachable = schema_closure(schemas, roots, excluded);
        let before = schemas.len();
        schemas.retain(|name, _| {
            let keep = reachable.contains(name);
            if !keep {
                tracing::debug!(schema = %name, excluded = excluded.contains(name.as_str()), "Removing schema");
            }
            keep
        });
        if schemas.len() == before {
            break;
        }
    }
}

fn is_dangling(value: &Value, known: &HashSet<String>) -> bool {
    schema_ref_name(value).is_some_and(|name| !known.contains(name))
}

/// Replace a dangling reference with an empty schema, or scrub inside it.
fn scrub_child(value: &mut Value, known: &HashSet<String>) {
    if is_dangling(value, known) {
        *value = Value::Object(Map::new());
    } else {
        scrub_dangling(value, known);
    }
}

/// Remove references to schemas not in `known`.
///
/// Dangling properties are dropped along with their `required` entries,
/// dangling composition members are dropped, and any other dangling
/// reference becomes `{}`.
fn scrub_dangling(value: &mut Value, known: &HashSet<String>) {
    match value {
        Value::Object(obj) => {
            let mut dropped = Vec::new();
            if let Some(Value::Object(props)) = obj.get_mut("properties") {
                props.retain(|name, prop| {
                    let dangling = is_dangling(prop, known);
                    if dangling {
                        dropped.push(name.clone());
                    }
                    !dangling
                });
            }
            if !dropped.is_empty() {
                remove_required(obj, &dropped);
            }
            for key in ["allOf", "oneOf", "anyOf"] {
                if let Some(Value::Array(members)) = obj.get_mut(key) {
                    members.retain(|member| !is_dangling(member, known));
                }
            }
            for child in obj.values_mut() {
                scrub_child(child, known);
            }
        }
        Value::Array(items) => {
            for item in items {
                scrub_child(item, known);
            }
        }
        _ => {}
    }
}
