//! Path pattern matching for endpoint rules.
//!
//! Endpoint rules use a small pattern language:
//!
//! - `/literal/segments` match literally
//! - `{name}` stands for exactly one path segment
//! - a trailing `*` means "this prefix and everything under it"
//!
//! Two variants exist. [`PathMatcher::matches`] compares a concrete request
//! path against a rule and never expands `{name}`. [`PathMatcher::matches_template`]
//! compares an OpenAPI path template (which always carries `{name}`
//! placeholders) against the same rule, treating parameter segments as
//! single-segment wildcards.
//!
//! # Usage
//!
//! ```ignore
//! use gigameter_access::policy::matcher::PathMatcher;
//!
//! let matcher = PathMatcher::new();
//! assert!(matcher.matches("/api/v1/measurements/42", "/api/v1/measurements*"));
//! assert!(matcher.matches_template("/api/v1/schools/{id}", "/api/v1/schools/{giga_id}"));
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;

/// Which side of the comparison is being matched against a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMatchMode {
    /// A concrete request path, as received on the wire.
    #[default]
    Request,
    /// An OpenAPI path template containing `{param}` segments.
    Template,
}

/// Matches request paths and path templates against endpoint patterns.
///
/// Thread-safe; compiled template patterns are cached.
pub struct PathMatcher {
    /// Compiled template patterns keyed by the rule string.
    regex_cache: RwLock<HashMap<String, Regex>>,
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.regex_cache.read().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("PathMatcher")
            .field("cached_patterns", &cached)
            .finish()
    }
}

impl PathMatcher {
    /// Create a new path matcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regex_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Match `path` against `pattern` in the given mode.
    #[must_use]
    pub fn matches_with(&self, path: &str, pattern: &str, mode: PathMatchMode) -> bool {
        match mode {
            PathMatchMode::Request => self.matches(path, pattern),
            PathMatchMode::Template => self.matches_template(path, pattern),
        }
    }

    /// Match a concrete request path against a rule.
    ///
    /// Succeeds on an exact match, an exact match differing by one trailing
    /// `/` on either side, or when the rule ends in `*` and the path starts
    /// with the rule's prefix. `{name}` placeholders are not expanded.
    #[must_use]
    pub fn matches(&self, request_path: &str, pattern: &str) -> bool {
        if exact_or_trailing_slash(request_path, pattern) {
            return true;
        }

        match pattern.strip_suffix('*') {
            Some(prefix) => request_path.starts_with(prefix),
            None => false,
        }
    }

    /// Match an OpenAPI path template against a rule.
    ///
    /// Exact and trailing-wildcard rules behave as in [`matches`](Self::matches).
    /// Otherwise the rule is compiled to an anchored expression in which
    /// `{name}` matches exactly one segment and `*` matches anything.
    #[must_use]
    pub fn matches_template(&self, template: &str, pattern: &str) -> bool {
        if exact_or_trailing_slash(template, pattern) {
            return true;
        }

        if let Some(prefix) = pattern.strip_suffix('*') {
            if template.starts_with(prefix) {
                return true;
            }
        }

        self.get_or_compile(pattern)
            .map(|re| re.is_match(template))
            .unwrap_or(false)
    }

    /// Get a compiled template pattern from cache or compile and cache it.
    fn get_or_compile(&self, pattern: &str) -> Option<Regex> {
        if let Some(re) = self
            .regex_cache
            .read()
            .ok()
            .and_then(|cache| cache.get(pattern).cloned())
        {
            return Some(re);
        }

        let re = match Regex::new(&template_regex(pattern)) {
            Ok(re) => re,
            Err(e) => {
                tracing::debug!(pattern, error = %e, "Unusable endpoint pattern");
                return None;
            }
        };
        if let Ok(mut cache) = self.regex_cache.write() {
            cache.insert(pattern.to_string(), re.clone());
        }

        Some(re)
    }
}

fn exact_or_trailing_slash(path: &str, pattern: &str) -> bool {
    if path == pattern {
        return true;
    }
    path.strip_suffix('/') == Some(pattern) || pattern.strip_suffix('/') == Some(path)
}

/// Translate a rule into an anchored regular expression.
fn template_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut rest = pattern;
    while !rest.is_empty() {
        if let Some(after_open) = rest.strip_prefix('{') {
            if let Some(close) = after_open.find('}') {
                out.push_str("[^/]+");
                rest = &after_open[close + 1..];
                continue;
            }
        }
        if let Some(after_star) = rest.strip_prefix('*') {
            out.push_str(".*");
            rest = after_star;
            continue;
        }

        let next = rest
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '{' || *c == '*')
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        out.push_str(&regex::escape(&rest[..next]));
        rest = &rest[next..];
    }

    out.push('$');
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Request Mode
    // -------------------------------------------------------------------------

    #[test]
    fn test_exact_match() {
        let m = PathMatcher::new();
        assert!(m.matches("/users", "/users"));
        assert!(!m.matches("/users/5", "/users"));
    }

    #[test]
    fn test_trailing_slash_either_side() {
        let m = PathMatcher::new();
        assert!(m.matches("/users/", "/users"));
        assert!(m.matches("/users", "/users/"));
        assert!(!m.matches("/users//", "/users"));
    }

    #[test]
    fn test_trailing_wildcard() {
        let m = PathMatcher::new();
        assert!(m.matches("/api/v1/measurements", "/api/v1/measurements*"));
        assert!(m.matches("/api/v1/measurements/v2/7", "/api/v1/measurements*"));
        assert!(m.matches("/api/v1/measurementsX", "/api/v1/measurements*"));
        assert!(!m.matches("/api/v1/schools", "/api/v1/measurements*"));
    }

    #[test]
    fn test_request_mode_does_not_expand_params() {
        let m = PathMatcher::new();
        assert!(!m.matches("/schools/42", "/schools/{id}"));
        assert!(m.matches("/schools/{id}", "/schools/{id}"));
    }

    // -------------------------------------------------------------------------
    // Template Mode
    // -------------------------------------------------------------------------

    #[test]
    fn test_template_param_segments() {
        let m = PathMatcher::new();
        assert!(m.matches_template("/schools/{id}", "/schools/{giga_id}"));
        assert!(m.matches_template("/schools/{id}/flags", "/schools/{x}/flags"));
        assert!(!m.matches_template("/schools/{id}/flags", "/schools/{x}"));
        assert!(!m.matches_template("/schools", "/schools/{x}"));
    }

    #[test]
    fn test_template_exact_and_wildcard() {
        let m = PathMatcher::new();
        assert!(m.matches_template("/users", "/users"));
        assert!(m.matches_template("/users/", "/users"));
        assert!(m.matches_template("/measurements/{id}", "/measurements*"));
        assert!(!m.matches_template("/users/{id}", "/users"));
    }

    #[test]
    fn test_template_escapes_literals() {
        let m = PathMatcher::new();
        assert!(m.matches_template("/v1.0/items/{id}", "/v1.0/items/{id}"));
        assert!(!m.matches_template("/v1x0/items/{id}", "/v1.0/items/{key}"));
    }

    #[test]
    fn test_template_mid_wildcard_in_regex_path() {
        let m = PathMatcher::new();
        assert!(m.matches_template("/a/{id}/b/c", "/a/{id}/*"));
    }

    #[test]
    fn test_matches_with_mode() {
        let m = PathMatcher::new();
        assert!(!m.matches_with("/s/{id}", "/s/{x}", PathMatchMode::Request));
        assert!(m.matches_with("/s/{id}", "/s/{x}", PathMatchMode::Template));
    }

    #[test]
    fn test_template_regex_translation() {
        assert_eq!(template_regex("/a/{id}/b"), r"^/a/[^/]+/b$");
        assert_eq!(template_regex("/a*"), r"^/a.*$");
        assert_eq!(template_regex("/a.b"), r"^/a\.b$");
    }

    #[test]
    fn test_regex_cache() {
        let m = PathMatcher::new();
        assert!(m.matches_template("/x/{a}", "/x/{b}"));
        assert!(m.matches_template("/x/{c}", "/x/{b}"));
        let cache = m.regex_cache.read().unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("/x/{b}"));
    }
}
