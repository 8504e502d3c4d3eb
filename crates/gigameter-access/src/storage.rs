//! Category configuration store abstraction.
//!
//! The registry only ever calls [`CategoryStore::list`]. Backends live
//! outside this crate (the server ships a file-backed one); an in-memory
//! [`StaticCategoryStore`] is provided for embedding and tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::policy::category::CategoryPolicyRecord;

/// Source of category configuration records.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// List every category record in store order.
    ///
    /// An empty list is not an error; the registry treats it as "nothing
    /// configured" and falls back to the built-in set.
    async fn list(&self) -> Result<Vec<CategoryPolicyRecord>, StoreError>;

    /// Fetch a single record by name.
    async fn get(&self, name: &str) -> Result<Option<CategoryPolicyRecord>, StoreError> {
        Ok(self.list().await?.into_iter().find(|r| r.name == name))
    }
}

/// Store holding a fixed record list.
#[derive(Debug, Clone, Default)]
pub struct StaticCategoryStore {
    records: Vec<CategoryPolicyRecord>,
}

impl StaticCategoryStore {
    /// Create a store serving `records`.
    #[must_use]
    pub fn new(records: Vec<CategoryPolicyRecord>) -> Self {
        Self { records }
    }

    /// Create a store with no records.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CategoryStore for StaticCategoryStore {
    async fn list(&self) -> Result<Vec<CategoryPolicyRecord>, StoreError> {
        Ok(self.records.clone())
    }
}

/// Decode a list of raw JSON values into records.
///
/// Values that are not objects or lack a string `name` are skipped with a
/// warning; every other field is read leniently.
#[must_use]
pub fn decode_records(values: Vec<Value>) -> Vec<CategoryPolicyRecord> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            match serde_json::from_value::<CategoryPolicyRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping undecodable category record");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_store_list_and_get() {
        let store = StaticCategoryStore::new(vec![
            CategoryPolicyRecord {
                name: "public".into(),
                ..Default::default()
            },
            CategoryPolicyRecord {
                name: "gov".into(),
                ..Default::default()
            },
        ]);

        assert_eq!(store.list().await.unwrap().len(), 2);
        assert_eq!(store.get("gov").await.unwrap().unwrap().name, "gov");
        assert!(store.get("admin").await.unwrap().is_none());
    }

    #[test]
    fn test_decode_records_skips_bad_entries() {
        let records = decode_records(vec![
            json!({"name": "public", "isDefault": true}),
            json!("nonsense"),
            json!({"isDefault": true}),
            json!({"name": "gov"}),
        ]);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["public", "gov"]);
    }
}
