//! Endpoint to schema mapping and schema reachability.

use std::collections::HashSet;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::openapi::node::{collect_refs, refs_of};

/// Path-item keys that hold operations.
pub const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// A documented operation, rendered as `path:METHOD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    /// Path template as written in the document.
    pub path: String,
    /// Upper-cased method.
    pub method: String,
}

impl OperationKey {
    /// Create a key; the method is upper-cased.
    #[must_use]
    pub fn new(path: impl Into<String>, method: &str) -> Self {
        Self {
            path: path.into(),
            method: method.to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.method)
    }
}

/// Component schemas each operation references directly from its request
/// body and response contents.
#[derive(Debug, Clone, Default)]
pub struct EndpointSchemaMap {
    entries: IndexMap<OperationKey, IndexSet<String>>,
}

impl EndpointSchemaMap {
    /// Build the map from a document's `paths` object.
    #[must_use]
    pub fn build(paths: &Map<String, Value>) -> Self {
        let mut entries = IndexMap::new();
        for (path, item) in paths {
            let Some(item) = item.as_object() else {
                continue;
            };
            for (method, operation) in item {
                if !HTTP_METHODS.contains(&method.as_str()) || !operation.is_object() {
                    continue;
                }
                entries.insert(OperationKey::new(path, method), operation_refs(operation));
            }
        }
        Self { entries }
    }

    /// Iterate over operations and their schemas.
    pub fn iter(&self) -> impl Iterator<Item = (&OperationKey, &IndexSet<String>)> {
        self.entries.iter()
    }

    /// Schemas referenced by `key`.
    #[must_use]
    pub fn schemas_of(&self, key: &OperationKey) -> Option<&IndexSet<String>> {
        self.entries.get(key)
    }

    /// Union of every operation's schemas.
    #[must_use]
    pub fn all_schemas(&self) -> IndexSet<String> {
        self.entries.values().flatten().cloned().collect()
    }

    /// Distinct document paths whose operations reference `schema`.
    #[must_use]
    pub fn paths_using(&self, schema: &str) -> IndexSet<&str> {
        self.entries
            .iter()
            .filter(|(_, schemas)| schemas.contains(schema))
            .map(|(key, _)| key.path.as_str())
            .collect()
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no operation was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// References found in an operation's request body and responses.
fn operation_refs(operation: &Value) -> IndexSet<String> {
    let mut refs = IndexSet::new();

    let request_contents = operation
        .get("requestBody")
        .and_then(|body| body.get("content"))
        .and_then(Value::as_object);
    let response_contents = operation
        .get("responses")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|responses| responses.values())
        .filter_map(|response| response.get("content").and_then(Value::as_object));

    for content in request_contents.into_iter().chain(response_contents) {
        for media in content.values() {
            if let Some(schema) = media.get("schema") {
                collect_refs(schema, &mut refs);
            }
        }
    }
    refs
}

/// Every schema reachable from `roots` through the `$ref`s of `schemas`.
///
/// Roots are included even when absent from `schemas`. Names in `blocked`
/// are neither included nor traversed.
#[must_use]
pub fn schema_closure<'a, I>(
    schemas: &Map<String, Value>,
    roots: I,
    blocked: &HashSet<&str>,
) -> HashSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut reachable = HashSet::new();
    let mut stack: Vec<String> = roots
        .into_iter()
        .filter(|name| !blocked.contains(name.as_str()))
        .cloned()
        .collect();

    while let Some(name) = stack.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        let Some(schema) = schemas.get(&name) else {
            continue;
        };
        for child in refs_of(schema) {
            if !reachable.contains(&child) && !blocked.contains(child.as_str()) {
                stack.push(child);
            }
        }
    }
    reachable
}
