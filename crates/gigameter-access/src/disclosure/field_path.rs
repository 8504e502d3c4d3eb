//! Field-path filtering of JSON values.
//!
//! A field path is a dot-separated list of keys. A segment ending in `[]`
//! marks an array whose elements receive the rest of the path; a plain
//! segment that happens to hold an array distributes the rest of the path
//! the same way.
//!
//! - **Include**: every key not named at the current level is removed; keys
//!   with a nested suffix are kept and filtered recursively.
//! - **Exclude**: keys named without a suffix are removed; keys with a
//!   suffix are kept and filtered recursively.
//!
//! Rules that do not resolve against the value are no-ops.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

/// Which way a rule list is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Keep only the named fields.
    Include,
    /// Remove the named fields.
    Exclude,
}

/// Rules grouped by their top-level key.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RuleGroups {
    /// Keys named with no further suffix.
    pub(crate) bare: IndexSet<String>,
    /// Keys with a suffix, mapped to the remaining paths.
    pub(crate) nested: IndexMap<String, Vec<String>>,
}

impl RuleGroups {
    /// Group `paths` by top-level segment, stripping a trailing `[]`.
    pub(crate) fn new<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut groups = Self::default();
        for path in paths {
            let path = path.as_ref();
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            let key = head.strip_suffix("[]").unwrap_or(head);
            if key.is_empty() {
                continue;
            }
            match rest.filter(|r| !r.is_empty()) {
                Some(rest) => groups
                    .nested
                    .entry(key.to_string())
                    .or_default()
                    .push(rest.to_string()),
                None => {
                    groups.bare.insert(key.to_string());
                }
            }
        }
        groups
    }

    /// Whether `key` is kept at this level in include mode.
    pub(crate) fn includes(&self, key: &str) -> bool {
        self.bare.contains(key) || self.nested.contains_key(key)
    }
}

/// Keep only the fields named by `paths`.
pub fn apply_include<S: AsRef<str>>(value: &mut Value, paths: &[S]) {
    apply(value, paths, FilterMode::Include);
}

/// Remove the fields named by `paths`.
pub fn apply_exclude<S: AsRef<str>>(value: &mut Value, paths: &[S]) {
    apply(value, paths, FilterMode::Exclude);
}

/// Apply `paths` in `mode`.
///
/// Objects are filtered directly, arrays element by element with the same
/// rule list, anything else is left alone.
pub fn apply<S: AsRef<str>>(value: &mut Value, paths: &[S], mode: FilterMode) {
    if paths.is_empty() {
        return;
    }
    let groups = RuleGroups::new(paths);
    apply_groups(value, &groups, mode);
}

fn apply_groups(value: &mut Value, groups: &RuleGroups, mode: FilterMode) {
    match value {
        Value::Object(map) => {
            match mode {
                FilterMode::Include => map.retain(|key, _| groups.includes(key)),
                FilterMode::Exclude => map.retain(|key, _| !groups.bare.contains(key)),
            }
            for (key, suffixes) in &groups.nested {
                if let Some(child) = map.get_mut(key) {
                    apply(child, suffixes, mode);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                apply_groups(item, groups, mode);
            }
        }
        _ => {}
    }
}
