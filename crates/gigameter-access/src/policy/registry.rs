//! Category registry.
//!
//! The registry owns the active set of category policies for the lifetime of
//! the process. It is loaded from a [`CategoryStore`] on first use (or an
//! explicit [`CategoryRegistry::initialize`]) and replaced wholesale on
//! [`CategoryRegistry::reload`].
//!
//! # Concurrency
//!
//! - Reads load the current [`CategorySnapshot`] through an `ArcSwapOption`
//!   and never take a lock.
//! - Loads are single-flight: concurrent callers that arrive while a load is
//!   in progress wait for it and share its result instead of issuing their
//!   own store call.
//! - A reload publishes a brand new snapshot; requests holding the previous
//!   `Arc` keep a complete, consistent view.
//!
//! # Fallback
//!
//! If the store returns nothing, fails, times out, or returns only unusable
//! records, the built-in policy set from [`defaults`](crate::policy::defaults)
//! is published instead. The cause is kept on the snapshot as
//! [`SnapshotSource::Builtin`] and never reaches API callers.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::error::{AccessError, AccessResult, ConfigurationUnavailable};
use crate::policy::category::CategoryPolicy;
use crate::policy::defaults::builtin_policies;
use crate::storage::CategoryStore;

/// Default bound on a single store fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Registry State
// =============================================================================

/// Lifecycle of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RegistryState {
    /// Nothing loaded yet.
    Uninitialized = 0,
    /// The first load is in progress.
    Loading = 1,
    /// A snapshot is published.
    Ready = 2,
}

impl RegistryState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Where a snapshot's policies came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    /// Records returned by the configuration store.
    Store,
    /// The built-in set, published because the store was unusable.
    Builtin {
        /// Why the store was not used.
        reason: ConfigurationUnavailable,
    },
}

impl SnapshotSource {
    /// Short label for logs and summaries.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Builtin { .. } => "builtin",
        }
    }
}

impl std::fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store => write!(f, "store"),
            Self::Builtin { reason } => write!(f, "builtin ({reason})"),
        }
    }
}

/// Immutable, versioned set of category policies.
#[derive(Debug)]
pub struct CategorySnapshot {
    categories: Vec<String>,
    default_policy: Arc<CategoryPolicy>,
    policies: HashMap<String, Arc<CategoryPolicy>>,
    source: SnapshotSource,
    version: u64,
    loaded_at: OffsetDateTime,
}

impl CategorySnapshot {
    /// Build a snapshot from policies in publication order.
    ///
    /// The first policy flagged `is_default` becomes the default; if none
    /// is flagged the first policy is used. Exactly one policy in the
    /// result carries `is_default = true`. An empty list publishes the
    /// built-in set.
    fn build(mut policies: Vec<CategoryPolicy>, mut source: SnapshotSource, version: u64) -> Self {
        if policies.is_empty() {
            policies = builtin_policies();
            source = SnapshotSource::Builtin {
                reason: ConfigurationUnavailable::NoValidRecords { rejected: 0 },
            };
        }

        let flagged: Vec<&str> = policies
            .iter()
            .filter(|p| p.is_default)
            .map(|p| p.name.as_str())
            .collect();
        if flagged.len() > 1 {
            tracing::warn!(
                flagged = ?flagged,
                chosen = flagged[0],
                "Multiple default categories configured; using the first"
            );
        }
        let default_index = policies.iter().position(|p| p.is_default).unwrap_or(0);

        let ordered: Vec<Arc<CategoryPolicy>> = policies
            .into_iter()
            .enumerate()
            .map(|(index, mut policy)| {
                policy.is_default = index == default_index;
                Arc::new(policy)
            })
            .collect();

        Self {
            categories: ordered.iter().map(|p| p.name.clone()).collect(),
            default_policy: ordered[default_index].clone(),
            policies: ordered
                .iter()
                .map(|p| (p.name.clone(), p.clone()))
                .collect(),
            source,
            version,
            loaded_at: OffsetDateTime::now_utc(),
        }
    }

    /// Category names in store order.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Name of the default category.
    #[must_use]
    pub fn default_category(&self) -> &str {
        &self.default_policy.name
    }

    /// The default category's policy.
    #[must_use]
    pub fn default_policy(&self) -> &Arc<CategoryPolicy> {
        &self.default_policy
    }

    /// Look up a policy by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<CategoryPolicy>> {
        self.policies.get(name)
    }

    /// Policies in store order.
    pub fn policies(&self) -> impl Iterator<Item = &Arc<CategoryPolicy>> {
        self.categories
            .iter()
            .filter_map(|name| self.policies.get(name))
    }

    /// Where this snapshot came from.
    #[must_use]
    pub fn source(&self) -> &SnapshotSource {
        &self.source
    }

    /// Monotonic version within this registry.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When this snapshot was published.
    #[must_use]
    pub fn loaded_at(&self) -> OffsetDateTime {
        self.loaded_at
    }

    /// Serializable summary of this snapshot.
    #[must_use]
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            version: self.version,
            source: self.source.label(),
            fallback_reason: match &self.source {
                SnapshotSource::Store => None,
                SnapshotSource::Builtin { reason } => Some(reason.to_string()),
            },
            categories: self.categories.clone(),
            default_category: self.default_category().to_string(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Serializable view of a snapshot's metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    /// Snapshot version.
    pub version: u64,
    /// `store` or `builtin`.
    pub source: &'static str,
    /// Why the built-in set was used, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    /// Category names in order.
    pub categories: Vec<String>,
    /// Default category name.
    pub default_category: String,
    /// Publication time.
    #[serde(with = "time::serde::rfc3339")]
    pub loaded_at: OffsetDateTime,
}

// =============================================================================
// Category Registry
// =============================================================================

/// Owner of the active category policy set.
pub struct CategoryRegistry {
    /// Configuration store.
    store: Arc<dyn CategoryStore>,

    /// Current snapshot, `None` until the first load completes.
    snapshot: ArcSwapOption<CategorySnapshot>,

    /// Serializes loads so concurrent callers share one store call.
    load_lock: Mutex<()>,

    /// [`RegistryState`] as a `u8`.
    state: AtomicU8,

    /// Last published version.
    version: AtomicU64,

    /// Bound on a single store fetch.
    fetch_timeout: Duration,
}

impl CategoryRegistry {
    /// Create a registry over `store` with the default fetch timeout.
    #[must_use]
    pub fn new(store: Arc<dyn CategoryStore>) -> Self {
        Self::with_fetch_timeout(store, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a registry with an explicit fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(store: Arc<dyn CategoryStore>, fetch_timeout: Duration) -> Self {
        Self {
            store,
            snapshot: ArcSwapOption::empty(),
            load_lock: Mutex::new(()),
            state: AtomicU8::new(RegistryState::Uninitialized as u8),
            version: AtomicU64::new(0),
            fetch_timeout,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RegistryState {
        RegistryState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The published snapshot, without triggering a load.
    #[must_use]
    pub fn current(&self) -> Option<Arc<CategorySnapshot>> {
        self.snapshot.load_full()
    }

    /// Load the registry if it has not been loaded yet.
    ///
    /// Callers arriving while the first load is running wait for it.
    pub async fn initialize(&self) -> Arc<CategorySnapshot> {
        if let Some(snapshot) = self.snapshot.load_full() {
            return snapshot;
        }

        let _guard = self.load_lock.lock().await;
        if let Some(snapshot) = self.snapshot.load_full() {
            return snapshot;
        }
        self.load_locked().await
    }

    /// Replace the active set with a fresh load from the store.
    ///
    /// If another load completes while this caller is waiting for the load
    /// lock, its result is returned instead of issuing a second store call.
    pub async fn reload(&self) -> Arc<CategorySnapshot> {
        let seen = self.version.load(Ordering::Acquire);

        let _guard = self.load_lock.lock().await;
        if self.version.load(Ordering::Acquire) != seen {
            if let Some(snapshot) = self.snapshot.load_full() {
                return snapshot;
            }
        }
        self.load_locked().await
    }

    /// The current snapshot, loading it first if necessary.
    pub async fn snapshot(&self) -> Arc<CategorySnapshot> {
        self.initialize().await
    }

    /// Look up a policy by name.
    pub async fn get_policy(&self, name: &str) -> Option<Arc<CategoryPolicy>> {
        self.snapshot().await.get(name).cloned()
    }

    /// Look up a policy by name, failing with [`AccessError::PolicyNotFound`].
    ///
    /// # Errors
    ///
    /// Returns `PolicyNotFound` if no policy has that name.
    pub async fn resolve(&self, name: &str) -> AccessResult<Arc<CategoryPolicy>> {
        self.get_policy(name)
            .await
            .ok_or_else(|| AccessError::policy_not_found(name))
    }

    /// Category names in order.
    pub async fn categories(&self) -> Vec<String> {
        self.snapshot().await.categories().to_vec()
    }

    /// Name of the default category.
    pub async fn default_category(&self) -> String {
        self.snapshot().await.default_category().to_string()
    }

    /// The default category's policy.
    pub async fn default_policy(&self) -> Arc<CategoryPolicy> {
        self.snapshot().await.default_policy().clone()
    }

    /// Fetch, build and publish a snapshot. Must hold `load_lock`.
    async fn load_locked(&self) -> Arc<CategorySnapshot> {
        if self.snapshot.load().is_none() {
            self.state
                .store(RegistryState::Loading as u8, Ordering::Release);
        }

        let version = self.version.load(Ordering::Acquire) + 1;
        let (policies, source) = match self.fetch_policies().await {
            Ok(policies) => (policies, SnapshotSource::Store),
            Err(reason) => {
                tracing::warn!(
                    reason = %reason,
                    "Category configuration unavailable, using built-in categories"
                );
                (builtin_policies(), SnapshotSource::Builtin { reason })
            }
        };
        let snapshot = Arc::new(CategorySnapshot::build(policies, source, version));

        self.snapshot.store(Some(snapshot.clone()));
        self.version.store(version, Ordering::Release);
        self.state.store(RegistryState::Ready as u8, Ordering::Release);

        tracing::info!(
            version,
            source = %snapshot.source(),
            categories = ?snapshot.categories(),
            default_category = %snapshot.default_category(),
            "Category registry loaded"
        );

        snapshot
    }

    /// Fetch and convert store records, classifying every way it can fail.
    async fn fetch_policies(&self) -> Result<Vec<CategoryPolicy>, ConfigurationUnavailable> {
        let records = match tokio::time::timeout(self.fetch_timeout, self.store.list()).await {
            Err(_) => {
                return Err(ConfigurationUnavailable::Timeout {
                    timeout_ms: self.fetch_timeout.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                return Err(ConfigurationUnavailable::Store {
                    message: e.to_string(),
                });
            }
            Ok(Ok(records)) => records,
        };

        if records.is_empty() {
            return Err(ConfigurationUnavailable::Empty);
        }

        let total = records.len();
        let mut seen = HashSet::with_capacity(total);
        let mut policies = Vec::with_capacity(total);
        for record in &records {
            match record.to_policy() {
                Ok(policy) => {
                    if !seen.insert(policy.name.clone()) {
                        tracing::warn!(category = %policy.name, "Skipping duplicate category record");
                        continue;
                    }
                    policies.push(policy);
                }
                Err(e) => {
                    tracing::warn!(category = %record.name, error = %e, "Skipping invalid category record");
                }
            }
        }

        if policies.is_empty() {
            return Err(ConfigurationUnavailable::NoValidRecords { rejected: total });
        }
        Ok(policies)
    }
}

impl std::fmt::Debug for CategoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryRegistry")
            .field("state", &self.state())
            .field("version", &self.version.load(Ordering::Relaxed))
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
