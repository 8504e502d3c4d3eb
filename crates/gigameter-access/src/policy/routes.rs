//! Statically declared per-route access requirements.
//!
//! Routes are identified by method and the router's path template
//! (e.g. `GET /api/v1/category-config/{name}`). A route may be marked public
//! (no category gate at all) or restricted to an explicit set of category
//! names. Routes absent from the table fall through to the category's
//! endpoint rules.

use std::collections::HashMap;

use super::category::normalize_category_name;

/// Access requirement for a single route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteAccess {
    /// Skip the category gate entirely.
    pub public: bool,
    /// If non-empty, the caller's category must be one of these names.
    pub required_categories: Vec<String>,
}

impl RouteAccess {
    /// A route that bypasses the category gate.
    #[must_use]
    pub fn public() -> Self {
        Self {
            public: true,
            required_categories: Vec::new(),
        }
    }

    /// A route restricted to the named categories.
    ///
    /// Names are normalized with [`normalize_category_name`].
    #[must_use]
    pub fn require<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            public: false,
            required_categories: categories
                .into_iter()
                .map(|c| normalize_category_name(c.as_ref()))
                .collect(),
        }
    }

    /// Returns `true` if `category` is listed. `category` must already be
    /// normalized.
    #[must_use]
    pub fn permits_category(&self, category: &str) -> bool {
        self.required_categories.iter().any(|c| c == category)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    method: String,
    route: String,
}

impl RouteKey {
    fn new(method: &str, route: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            route: route.to_string(),
        }
    }
}

/// Table of route requirements keyed by `(METHOD, route template)`.
///
/// A method of `"*"` applies to every method on that route; an entry for the
/// exact method wins over it.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<RouteKey, RouteAccess>,
}

impl RouteTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a requirement for `method route`.
    #[must_use]
    pub fn with(mut self, method: &str, route: &str, access: RouteAccess) -> Self {
        self.insert(method, route, access);
        self
    }

    /// Declare a public route.
    #[must_use]
    pub fn public(self, method: &str, route: &str) -> Self {
        self.with(method, route, RouteAccess::public())
    }

    /// Declare a route restricted to `categories`.
    #[must_use]
    pub fn require<I, S>(self, method: &str, route: &str, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with(method, route, RouteAccess::require(categories))
    }

    /// Insert or replace a requirement.
    pub fn insert(&mut self, method: &str, route: &str, access: RouteAccess) {
        self.routes.insert(RouteKey::new(method, route), access);
    }

    /// Merge another table into this one; entries in `other` win.
    pub fn extend(&mut self, other: RouteTable) {
        self.routes.extend(other.routes);
    }

    /// Look up the requirement for `method route`.
    #[must_use]
    pub fn lookup(&self, method: &str, route: &str) -> Option<&RouteAccess> {
        self.routes
            .get(&RouteKey::new(method, route))
            .or_else(|| self.routes.get(&RouteKey::new("*", route)))
    }

    /// Number of declared routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_exact_method() {
        let table = RouteTable::new()
            .public("GET", "/healthz")
            .require("post", "/admin/reload", ["admin"]);

        assert!(table.lookup("GET", "/healthz").unwrap().public);
        assert!(table.lookup("POST", "/healthz").is_none());
        let access = table.lookup("POST", "/admin/reload").unwrap();
        assert!(access.permits_category("admin"));
        assert!(!access.permits_category("Admin"));
    }

    #[test]
    fn test_required_names_are_normalized() {
        let table = RouteTable::new().require("GET", "/partners", [" Partner "]);
        let access = table.lookup("GET", "/partners").unwrap();
        assert_eq!(access.required_categories, vec!["partner"]);
        assert!(access.permits_category("partner"));
    }

    #[test]
    fn test_wildcard_method_fallback() {
        let table = RouteTable::new()
            .require("*", "/admin", ["admin"])
            .public("GET", "/admin");

        assert!(table.lookup("GET", "/admin").unwrap().public);
        assert!(!table.lookup("DELETE", "/admin").unwrap().public);
    }

    #[test]
    fn test_extend_overrides() {
        let mut table = RouteTable::new().public("GET", "/a");
        table.extend(RouteTable::new().require("GET", "/a", ["gov"]));
        assert_eq!(table.len(), 1);
        assert!(!table.lookup("GET", "/a").unwrap().public);
    }
}
