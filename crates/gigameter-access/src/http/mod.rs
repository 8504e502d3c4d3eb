//! Axum integration types.

mod error;

/// Category assigned to the current request.
///
/// An authentication layer may insert it into the request extensions; the
/// category gate inserts it when absent so downstream handlers and the
/// response disclosure filter see the same category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCategory(pub String);

impl ResolvedCategory {
    /// Create a resolved category.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The category name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResolvedCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
