//! Category hot-reload.
//!
//! - [`CategoryChange`]: events that invalidate the active snapshot
//! - [`CategoryChangeNotifier`]: broadcast channel carrying those events
//! - [`CategoryReloadService`]: background task that debounces events,
//!   refreshes periodically and retries loads that fell back to the
//!   built-in set because the store misbehaved
//!
//! # Example
//!
//! ```ignore
//! let notifier = Arc::new(CategoryChangeNotifier::new(64));
//! let service = Arc::new(CategoryReloadService::new(
//!     registry.clone(),
//!     notifier.clone(),
//!     ReloadConfig::default(),
//! ));
//! tokio::spawn({
//!     let service = service.clone();
//!     async move { service.run().await }
//! });
//!
//! notifier.notify(CategoryChange::Updated { name: "gov".to_string() });
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};

use crate::error::ConfigurationUnavailable;
use crate::policy::registry::{CategoryRegistry, CategorySnapshot, SnapshotSource};

// =============================================================================
// Change Events
// =============================================================================

/// A change to the category configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryChange {
    /// A category was created or modified.
    Updated {
        /// Category name.
        name: String,
    },
    /// A category was removed.
    Deleted {
        /// Category name.
        name: String,
    },
    /// The whole configuration should be re-read.
    BulkReload,
}

impl CategoryChange {
    /// Category name, if this change concerns one category.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Updated { name } | Self::Deleted { name } => Some(name),
            Self::BulkReload => None,
        }
    }
}

/// Broadcast channel for category change notifications.
pub struct CategoryChangeNotifier {
    sender: broadcast::Sender<CategoryChange>,
}

impl CategoryChangeNotifier {
    /// Create a notifier buffering at most `capacity` pending events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Notify all subscribers. Dropped silently if nobody listens.
    pub fn notify(&self, change: CategoryChange) {
        let _ = self.sender.send(change);
    }

    /// Subscribe to future notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CategoryChange> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for CategoryChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Reload service settings.
#[derive(Debug, Clone)]
pub struct ReloadConfig {
    /// Quiet period before a burst of notifications triggers one reload.
    pub debounce_ms: u64,

    /// Periodic refresh interval in seconds; 0 disables it.
    pub periodic_refresh_secs: u64,

    /// Attempts per reload before giving up.
    pub max_retry_attempts: usize,

    /// Initial retry backoff, doubled after every failed attempt.
    pub retry_backoff_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            periodic_refresh_secs: 0,
            max_retry_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl ReloadConfig {
    /// Default settings with a periodic refresh every `secs` seconds.
    #[must_use]
    pub fn with_periodic_refresh(secs: u64) -> Self {
        Self {
            periodic_refresh_secs: secs,
            ..Default::default()
        }
    }

    /// Fast timings for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            debounce_ms: 10,
            periodic_refresh_secs: 0,
            max_retry_attempts: 3,
            retry_backoff_ms: 10,
        }
    }
}

/// Counters exposed by [`CategoryReloadService::stats`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadStats {
    /// Store loads attempted.
    pub reload_attempts: u64,
    /// Reloads that published store records.
    pub successful_reloads: u64,
    /// Reloads that exhausted their retries.
    pub failed_reloads: u64,
    /// Notifications received.
    pub notifications_received: u64,
    /// Notifications folded into an already pending reload.
    pub notifications_debounced: u64,
}

// =============================================================================
// Reload Service
// =============================================================================

/// Background reloader for a [`CategoryRegistry`].
pub struct CategoryReloadService {
    registry: Arc<CategoryRegistry>,
    notifier: Arc<CategoryChangeNotifier>,
    config: ReloadConfig,
    shutdown: AtomicBool,

    reload_attempts: AtomicU64,
    successful_reloads: AtomicU64,
    failed_reloads: AtomicU64,
    notifications_received: AtomicU64,
    notifications_debounced: AtomicU64,
}

impl CategoryReloadService {
    /// Create a reload service.
    #[must_use]
    pub fn new(
        registry: Arc<CategoryRegistry>,
        notifier: Arc<CategoryChangeNotifier>,
        config: ReloadConfig,
    ) -> Self {
        Self {
            registry,
            notifier,
            config,
            shutdown: AtomicBool::new(false),
            reload_attempts: AtomicU64::new(0),
            successful_reloads: AtomicU64::new(0),
            failed_reloads: AtomicU64::new(0),
            notifications_received: AtomicU64::new(0),
            notifications_debounced: AtomicU64::new(0),
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is called or the channel closes.
    pub async fn run(&self) {
        let mut receiver = self.notifier.subscribe();
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let periodic = (self.config.periodic_refresh_secs > 0)
            .then(|| Duration::from_secs(self.config.periodic_refresh_secs));

        let mut pending_reload = false;
        let mut last_notification = Instant::now();
        let mut last_refresh = Instant::now();

        loop {
            if self.is_shutting_down() {
                tracing::info!("Category reload service shutting down");
                break;
            }

            let periodic_remaining = periodic
                .map(|d| d.saturating_sub(last_refresh.elapsed()))
                .unwrap_or(Duration::MAX);
            let timeout = if pending_reload {
                debounce
                    .saturating_sub(last_notification.elapsed())
                    .min(periodic_remaining)
            } else {
                periodic_remaining
            };

            tokio::select! {
                result = receiver.recv() => {
                    match result {
                        Ok(change) => {
                            tracing::debug!(change = ?change, "Category change received");
                            self.notifications_received.fetch_add(1, Ordering::Relaxed);
                            if pending_reload {
                                self.notifications_debounced.fetch_add(1, Ordering::Relaxed);
                            }
                            pending_reload = true;
                            last_notification = Instant::now();
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "Missed category change notifications");
                            self.notifications_debounced.fetch_add(n, Ordering::Relaxed);
                            pending_reload = true;
                            last_notification = Instant::now();
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Category change channel closed");
                            break;
                        }
                    }
                }

                _ = tokio::time::sleep(timeout) => {
                    let periodic_due = periodic.is_some_and(|d| last_refresh.elapsed() >= d);
                    if pending_reload && last_notification.elapsed() >= debounce {
                        pending_reload = false;
                        self.perform_reload().await;
                        last_refresh = Instant::now();
                    } else if periodic_due {
                        tracing::debug!("Periodic category refresh");
                        self.perform_reload().await;
                        last_refresh = Instant::now();
                    }
                }
            }
        }
    }

    async fn perform_reload(&self) {
        if let Err(reason) = self.reload_with_retry().await {
            tracing::error!(reason = %reason, "Category reload failed after all retries");
        }
    }

    /// Reload the registry, retrying with exponential backoff while the store
    /// is faulty.
    ///
    /// Every attempt publishes a snapshot, so the registry stays usable even
    /// when all attempts fail. An intentionally empty store is not retried.
    ///
    /// # Errors
    ///
    /// Returns the last fallback reason once the attempts are exhausted.
    pub async fn reload_with_retry(&self) -> Result<Arc<CategorySnapshot>, ConfigurationUnavailable> {
        let mut attempts = 0;
        let mut backoff = self.config.retry_backoff_ms;

        loop {
            self.reload_attempts.fetch_add(1, Ordering::Relaxed);
            let snapshot = self.registry.reload().await;

            let reason = match snapshot.source() {
                SnapshotSource::Builtin { reason } if reason.is_failure() => reason.clone(),
                _ => {
                    self.successful_reloads.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        version = snapshot.version(),
                        source = %snapshot.source(),
                        "Category registry reloaded"
                    );
                    return Ok(snapshot);
                }
            };

            attempts += 1;
            if attempts >= self.config.max_retry_attempts {
                self.failed_reloads.fetch_add(1, Ordering::Relaxed);
                return Err(reason);
            }

            tracing::warn!(
                attempt = attempts,
                max_attempts = self.config.max_retry_attempts,
                reason = %reason,
                backoff_ms = backoff,
                "Category reload fell back to built-in set, retrying"
            );
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            backoff = backoff.saturating_mul(2);
        }
    }

    /// Queue a full reload through the notifier.
    pub fn trigger_reload(&self) {
        self.notifier.notify(CategoryChange::BulkReload);
    }

    /// Ask the run loop to exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown was requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ReloadStats {
        ReloadStats {
            reload_attempts: self.reload_attempts.load(Ordering::Relaxed),
            successful_reloads: self.successful_reloads.load(Ordering::Relaxed),
            failed_reloads: self.failed_reloads.load(Ordering::Relaxed),
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            notifications_debounced: self.notifications_debounced.load(Ordering::Relaxed),
        }
    }

    /// The registry being reloaded.
    #[must_use]
    pub fn registry(&self) -> &Arc<CategoryRegistry> {
        &self.registry
    }

    /// The notifier this service listens on.
    #[must_use]
    pub fn notifier(&self) -> &Arc<CategoryChangeNotifier> {
        &self.notifier
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::policy::category::CategoryPolicyRecord;
    use crate::storage::CategoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    // -------------------------------------------------------------------------
    // Mock Store
    // -------------------------------------------------------------------------

    struct MockStore {
        records: Vec<CategoryPolicyRecord>,
        call_count: AtomicUsize,
        fail_count: AtomicUsize,
    }

    impl MockStore {
        fn with_names(names: &[&str]) -> Self {
            Self {
                records: names
                    .iter()
                    .map(|n| CategoryPolicyRecord {
                        name: (*n).to_string(),
                        ..Default::default()
                    })
                    .collect(),
                call_count: AtomicUsize::new(0),
                fail_count: AtomicUsize::new(0),
            }
        }

        fn set_fail_count(&self, count: usize) {
            self.fail_count.store(count, Ordering::SeqCst);
        }

        fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CategoryStore for MockStore {
        async fn list(&self) -> Result<Vec<CategoryPolicyRecord>, StoreError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_count.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_count.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::unavailable("simulated outage"));
            }
            Ok(self.records.clone())
        }
    }

    fn service(store: Arc<MockStore>, config: ReloadConfig) -> CategoryReloadService {
        let registry = Arc::new(CategoryRegistry::new(store));
        CategoryReloadService::new(registry, Arc::new(CategoryChangeNotifier::new(16)), config)
    }

    // -------------------------------------------------------------------------
    // CategoryChange / Notifier
    // -------------------------------------------------------------------------

    #[test]
    fn test_change_category() {
        assert_eq!(
            CategoryChange::Updated { name: "gov".into() }.category(),
            Some("gov")
        );
        assert_eq!(
            CategoryChange::Deleted { name: "x".into() }.category(),
            Some("x")
        );
        assert_eq!(CategoryChange::BulkReload.category(), None);
    }

    #[tokio::test]
    async fn test_notifier_multiple_subscribers() {
        let notifier = CategoryChangeNotifier::new(16);
        let mut r1 = notifier.subscribe();
        let mut r2 = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.notify(CategoryChange::BulkReload);
        assert_eq!(r1.recv().await.unwrap(), CategoryChange::BulkReload);
        assert_eq!(r2.recv().await.unwrap(), CategoryChange::BulkReload);
    }

    #[test]
    fn test_notifier_without_subscribers() {
        let notifier = CategoryChangeNotifier::default();
        notifier.notify(CategoryChange::BulkReload);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn test_reload_config_presets() {
        let config = ReloadConfig::default();
        assert_eq!(config.debounce_ms, 100);
        assert_eq!(config.periodic_refresh_secs, 0);
        assert_eq!(ReloadConfig::with_periodic_refresh(60).periodic_refresh_secs, 60);
        assert_eq!(ReloadConfig::for_testing().retry_backoff_ms, 10);
    }

    // -------------------------------------------------------------------------
    // Retry
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_reload_with_retry_success() {
        let store = Arc::new(MockStore::with_names(&["public", "gov"]));
        let service = service(store.clone(), ReloadConfig::for_testing());

        let snapshot = service.reload_with_retry().await.unwrap();
        assert_eq!(snapshot.source(), &SnapshotSource::Store);
        assert_eq!(store.call_count(), 1);

        let stats = service.stats();
        assert_eq!(stats.reload_attempts, 1);
        assert_eq!(stats.successful_reloads, 1);
        assert_eq!(stats.failed_reloads, 0);
    }

    #[tokio::test]
    async fn test_reload_with_retry_recovers() {
        let store = Arc::new(MockStore::with_names(&["public"]));
        store.set_fail_count(2);
        let service = service(store.clone(), ReloadConfig::for_testing());

        let snapshot = service.reload_with_retry().await.unwrap();
        assert_eq!(snapshot.source(), &SnapshotSource::Store);
        assert_eq!(store.call_count(), 3);
        assert_eq!(service.stats().reload_attempts, 3);
    }

    #[tokio::test]
    async fn test_reload_with_retry_exhausted_keeps_builtin() {
        let store = Arc::new(MockStore::with_names(&["public"]));
        store.set_fail_count(10);
        let service = service(store.clone(), ReloadConfig::for_testing());

        let err = service.reload_with_retry().await.unwrap_err();
        assert!(matches!(err, ConfigurationUnavailable::Store { .. }));
        assert_eq!(store.call_count(), 3);
        assert_eq!(service.stats().failed_reloads, 1);

        let current = service.registry().current().unwrap();
        assert_eq!(current.source().label(), "builtin");
        assert_eq!(current.default_category(), "public");
    }

    #[tokio::test]
    async fn test_empty_store_is_not_retried() {
        let store = Arc::new(MockStore::with_names(&[]));
        let service = service(store.clone(), ReloadConfig::for_testing());

        let snapshot = service.reload_with_retry().await.unwrap();
        assert_eq!(snapshot.source().label(), "builtin");
        assert_eq!(store.call_count(), 1);
    }

    // -------------------------------------------------------------------------
    // Run loop
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_trigger_reload_sends_bulk_reload() {
        let store = Arc::new(MockStore::with_names(&["public"]));
        let service = service(store, ReloadConfig::for_testing());
        let mut receiver = service.notifier().subscribe();

        service.trigger_reload();
        assert_eq!(receiver.recv().await.unwrap(), CategoryChange::BulkReload);
    }

    #[tokio::test]
    async fn test_run_debounces_notifications() {
        let store = Arc::new(MockStore::with_names(&["public"]));
        let config = ReloadConfig {
            debounce_ms: 50,
            periodic_refresh_secs: 0,
            max_retry_attempts: 1,
            retry_backoff_ms: 10,
        };
        let service = Arc::new(service(store.clone(), config));

        let handle = tokio::spawn({
            let service = service.clone();
            async move { service.run().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        for name in ["a", "b", "c", "d", "e"] {
            service.notifier().notify(CategoryChange::Updated {
                name: name.to_string(),
            });
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let stats = service.stats();
        assert_eq!(stats.notifications_received, 5);
        assert!(stats.notifications_debounced >= 1);
        assert_eq!(store.call_count(), 1);
        assert_eq!(service.registry().current().unwrap().version(), 1);

        service.shutdown();
        assert!(service.is_shutting_down());
        service.trigger_reload();
        let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;
    }
}
