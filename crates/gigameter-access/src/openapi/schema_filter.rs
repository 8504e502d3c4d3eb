//! Property-level filtering of component schemas.
//!
//! The field-path rules used for response bodies are applied to a schema's
//! `properties`. Removed property names are pulled out of `required` too.
//! Rules that continue through a `$ref` property act on a copy of the
//! referenced schema which then replaces the reference inline, so schemas
//! shared with other endpoints are never altered.

use serde_json::{Map, Value};

use crate::disclosure::field_path::{FilterMode, RuleGroups};
use crate::openapi::node::schema_ref_name;
use crate::policy::category::FieldRules;

/// Limit on nested inline copies, reached only by self-referencing schemas.
const MAX_INLINE_DEPTH: usize = 8;

/// Filter `schema` with `rules`, resolving `$ref`s against `snapshot`.
///
/// A non-empty include list wins over the exclude list. Returns `true` if
/// the schema changed. A schema that is itself a bare `$ref` is left alone.
pub fn filter_schema_properties(
    schema: &mut Value,
    rules: &FieldRules,
    snapshot: &Map<String, Value>,
) -> bool {
    let (paths, mode) = if !rules.include.is_empty() {
        (&rules.include, FilterMode::Include)
    } else if !rules.exclude.is_empty() {
        (&rules.exclude, FilterMode::Exclude)
    } else {
        return false;
    };
    if schema_ref_name(schema).is_some() {
        return false;
    }

    let groups = RuleGroups::new(paths);
    filter_node(schema, &groups, mode, snapshot, 0)
}

fn filter_node(
    node: &mut Value,
    groups: &RuleGroups,
    mode: FilterMode,
    snapshot: &Map<String, Value>,
    depth: usize,
) -> bool {
    if let Some(name) = schema_ref_name(node).map(str::to_owned) {
        if depth >= MAX_INLINE_DEPTH {
            return false;
        }
        let Some(target) = snapshot.get(&name) else {
            return false;
        };
        let mut copy = target.clone();
        if filter_node(&mut copy, groups, mode, snapshot, depth + 1) {
            tracing::trace!(schema = %name, "Inlined filtered copy of referenced schema");
            *node = copy;
            return true;
        }
        return false;
    }

    let Some(obj) = node.as_object_mut() else {
        return false;
    };
    if obj.contains_key("properties") {
        return filter_properties(obj, groups, mode, snapshot, depth);
    }
    match obj.get_mut("items") {
        Some(items) => filter_node(items, groups, mode, snapshot, depth),
        None => false,
    }
}

fn filter_properties(
    obj: &mut Map<String, Value>,
    groups: &RuleGroups,
    mode: FilterMode,
    snapshot: &Map<String, Value>,
    depth: usize,
) -> bool {
    let mut removed = Vec::new();
    let mut changed = false;

    if let Some(Value::Object(props)) = obj.get_mut("properties") {
        props.retain(|key, _| {
            let keep = match mode {
                FilterMode::Include => groups.includes(key),
                FilterMode::Exclude => !groups.bare.contains(key),
            };
            if !keep {
                removed.push(key.clone());
            }
            keep
        });

        for (key, suffixes) in &groups.nested {
            if let Some(prop) = props.get_mut(key) {
                let nested = RuleGroups::new(suffixes);
                changed |= filter_node(prop, &nested, mode, snapshot, depth);
            }
        }
    }

    if !removed.is_empty() {
        remove_required(obj, &removed);
        changed = true;
    }
    changed
}

/// Drop `names` from the schema's `required` list.
pub(crate) fn remove_required(obj: &mut Map<String, Value>, names: &[String]) {
    if let Some(Value::Array(required)) = obj.get_mut("required") {
        required.retain(|v| v.as_str().is_none_or(|s| !names.iter().any(|n| n == s)));
    }
}
