//! Typed view over OpenAPI schema nodes.
//!
//! Schema trees arrive as untyped JSON. [`SchemaNode::classify`] turns a
//! node into one of four shapes so every walker matches exhaustively instead
//! of probing keys ad hoc.

use indexmap::IndexSet;
use serde_json::{Map, Value};

/// Prefix of references that participate in the schema graph.
pub const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// Keys that never contain nested schemas.
const NON_STRUCTURAL_KEYS: &[&str] = &[
    "description",
    "type",
    "format",
    "example",
    "title",
    "nullable",
];

/// Shape of a schema node.
#[derive(Debug, Clone, Copy)]
pub enum SchemaNode<'a> {
    /// `{"$ref": "#/components/schemas/<name>"}`.
    Ref(&'a str),
    /// Any other object.
    Object(&'a Map<String, Value>),
    /// A JSON array (e.g. the members of `allOf`).
    Array(&'a [Value]),
    /// Strings, numbers, booleans and `null`.
    Scalar(&'a Value),
}

impl<'a> SchemaNode<'a> {
    /// Classify `value`.
    #[must_use]
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => match schema_ref_name(value) {
                Some(name) => Self::Ref(name),
                None => Self::Object(map),
            },
            Value::Array(items) => Self::Array(items),
            other => Self::Scalar(other),
        }
    }
}

/// Name of the component schema `value` references, if it is such a
/// reference.
///
/// References outside `#/components/schemas/` yield `None`.
#[must_use]
pub fn schema_ref_name(value: &Value) -> Option<&str> {
    value
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix(SCHEMA_REF_PREFIX))
        .filter(|name| !name.is_empty() && !name.contains('/'))
}

/// Build a `$ref` node pointing at component schema `name`.
#[must_use]
pub fn schema_ref(name: &str) -> Value {
    let mut map = Map::new();
    map.insert(
        "$ref".to_string(),
        Value::String(format!("{SCHEMA_REF_PREFIX}{name}")),
    );
    Value::Object(map)
}

/// Collect every component schema referenced anywhere inside `value`.
///
/// A reference node is recorded and not descended into. Non-structural keys
/// are skipped.
pub fn collect_refs(value: &Value, refs: &mut IndexSet<String>) {
    match SchemaNode::classify(value) {
        SchemaNode::Ref(name) => {
            refs.insert(name.to_string());
        }
        SchemaNode::Object(map) => {
            for (key, child) in map {
                // Property names are data, not keywords.
                if key == "properties" {
                    if let Value::Object(props) = child {
                        props.values().for_each(|prop| collect_refs(prop, refs));
                        continue;
                    }
                }
                if NON_STRUCTURAL_KEYS.contains(&key.as_str()) {
                    continue;
                }
                collect_refs(child, refs);
            }
        }
        SchemaNode::Array(items) => {
            for item in items {
                collect_refs(item, refs);
            }
        }
        SchemaNode::Scalar(_) => {}
    }
}

/// Convenience wrapper returning the references of `value`.
#[must_use]
pub fn refs_of(value: &Value) -> IndexSet<String> {
    let mut refs = IndexSet::new();
    collect_refs(value, &mut refs);
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify() {
        let r = json!({"$ref": "#/components/schemas/User"});
        assert!(matches!(SchemaNode::classify(&r), SchemaNode::Ref("User")));
        assert!(matches!(
            SchemaNode::classify(&json!({"type": "object"})),
            SchemaNode::Object(_)
        ));
        assert!(matches!(SchemaNode::classify(&json!([1])), SchemaNode::Array(_)));
        assert!(matches!(SchemaNode::classify(&json!(null)), SchemaNode::Scalar(_)));
    }

    #[test]
    fn test_foreign_refs_are_not_schema_refs() {
        assert_eq!(
            schema_ref_name(&json!({"$ref": "#/components/responses/NotFound"})),
            None
        );
        assert_eq!(schema_ref_name(&json!({"$ref": "other.json#/Thing"})), None);
        assert_eq!(schema_ref_name(&json!({"$ref": 5})), None);
    }

    #[test]
    fn test_collect_refs_walks_structure() {
        let schema = json!({
            "type": "object",
            "description": "has {\"$ref\"} text",
            "properties": {
                "owner": {"$ref": "#/components/schemas/User"},
                "tags": {"type": "array", "items": {"$ref": "#/components/schemas/Tag"}},
                "extra": {"additionalProperties": {"$ref": "#/components/schemas/Meta"}},
                "either": {"oneOf": [
                    {"$ref": "#/components/schemas/A"},
                    {"$ref": "#/components/schemas/User"}
                ]}
            },
            "example": {"$ref": "#/components/schemas/Ignored"}
        });
        let refs: Vec<_> = refs_of(&schema).into_iter().collect();
        assert_eq!(refs, vec!["User", "Tag", "Meta", "A"]);
    }

    #[test]
    fn test_property_named_like_keyword() {
        let schema = json!({
            "properties": {
                "description": {"$ref": "#/components/schemas/Text"},
                "type": {"$ref": "#/components/schemas/Kind"}
            }
        });
        let refs: Vec<_> = refs_of(&schema).into_iter().collect();
        assert_eq!(refs, vec!["Text", "Kind"]);
    }

    #[test]
    fn test_schema_ref_builder() {
        assert_eq!(schema_ref_name(&schema_ref("Post")), Some("Post"));
    }
}
