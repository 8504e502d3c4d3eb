//! File-backed category store.
//!
//! The file holds category records either as a JSON array, a JSON object
//! with a `categories` array, or (for `.toml` files) a `[[categories]]`
//! array of tables. The file is re-read on every [`CategoryStore::list`]
//! call; the registry decides when that happens.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gigameter_access::policy::{CategoryChange, CategoryChangeNotifier, CategoryPolicyRecord};
use gigameter_access::{CategoryStore, StoreError, decode_records};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Default quiet period before a file change is reported.
pub const DEFAULT_WATCH_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Category store reading records from a local file.
#[derive(Debug, Clone)]
pub struct FileCategoryStore {
    path: PathBuf,
    format: FileFormat,
}

impl FileCategoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = FileFormat::of(&path);
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Watch the file and publish [`CategoryChange::BulkReload`] whenever
    /// it changes.
    ///
    /// The parent directory is watched so editors that replace the file
    /// are still seen.
    pub fn watch(
        &self,
        notifier: Arc<CategoryChangeNotifier>,
        debounce: Duration,
    ) -> StoreWatchHandle {
        let path = self.path.clone();
        let watch_path = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let (event_tx, mut event_rx) = mpsc::unbounded_channel::<DebounceEventResult>();

            let mut debouncer = match new_debouncer(debounce, move |res: DebounceEventResult| {
                let _ = event_tx.send(res);
            }) {
                Ok(d) => d,
                Err(e) => {
                    error!(error = %e, "Failed to create category file watcher");
                    return;
                }
            };

            if let Err(e) = debouncer
                .watcher()
                .watch(&watch_path, RecursiveMode::NonRecursive)
            {
                error!(path = ?watch_path, error = %e, "Failed to watch category file");
                return;
            }

            info!(path = ?path, "Watching category file");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Category file watcher shutting down");
                        break;
                    }
                    events = event_rx.recv() => {
                        let Some(events) = events else { break };
                        match events {
                            Ok(events) => {
                                if events.iter().any(|e| e.path.file_name() == path.file_name()) {
                                    info!(path = ?path, "Category file changed");
                                    notifier.notify(CategoryChange::BulkReload);
                                }
                            }
                            Err(e) => warn!(error = %e, "Category file watcher error"),
                        }
                    }
                }
            }
        });

        StoreWatchHandle {
            task,
            shutdown: Some(shutdown_tx),
        }
    }

    fn parse(&self, content: &str) -> Result<Vec<Value>, StoreError> {
        let document: Value = match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| StoreError::parse(format!("{}: {e}", self.path.display())))?,
            FileFormat::Toml => {
                let table: toml::Table = toml::from_str(content)
                    .map_err(|e| StoreError::parse(format!("{}: {e}", self.path.display())))?;
                serde_json::to_value(table).map_err(|e| StoreError::parse(e.to_string()))?
            }
        };

        match document {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => match map.remove("categories") {
                Some(Value::Array(items)) => Ok(items),
                None => Ok(Vec::new()),
                Some(_) => Err(StoreError::parse(format!(
                    "{}: `categories` must be an array",
                    self.path.display()
                ))),
            },
            _ => Err(StoreError::parse(format!(
                "{}: expected an array of category records",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl CategoryStore for FileCategoryStore {
    async fn list(&self) -> Result<Vec<CategoryPolicyRecord>, StoreError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let values = self.parse(&content)?;
        Ok(decode_records(values))
    }
}

/// Keeps a file watcher alive until stopped or dropped.
pub struct StoreWatchHandle {
    task: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StoreWatchHandle {
    /// Stop watching and wait for the watcher task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for StoreWatchHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_reads_json_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("categories.json");
        fs::write(
            &path,
            r#"[
                {"name": "public", "isDefault": true, "allowedAPIs": [{"url": "/api/v1/schools", "methods": ["get"]}]},
                {"name": "admin", "swagger": {"visible": true}}
            ]"#,
        )
        .unwrap();

        let store = FileCategoryStore::new(&path);
        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "public");
        assert!(records[0].is_default);
    }

    #[tokio::test]
    async fn test_reads_json_object_with_categories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("categories.json");
        fs::write(&path, r#"{"categories": [{"name": "gov"}]}"#).unwrap();

        let records = FileCategoryStore::new(&path).list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "gov");
    }

    #[tokio::test]
    async fn test_reads_toml_categories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("categories.toml");
        fs::write(
            &path,
            r#"
[[categories]]
name = "public"
isDefault = true

[[categories.allowedAPIs]]
url = "/api/v1/measurements"
methods = ["GET"]

[[categories]]
name = "admin"
"#,
        )
        .unwrap();

        let store = FileCategoryStore::new(&path);
        let records = store.list().await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["public", "admin"]);

        let policy = records[0].to_policy().unwrap();
        assert_eq!(policy.allowed_endpoints.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = FileCategoryStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.list().await, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("categories.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileCategoryStore::new(&path).list().await,
            Err(StoreError::Parse { .. })
        ));

        fs::write(&path, r#""just a string""#).unwrap();
        assert!(matches!(
            FileCategoryStore::new(&path).list().await,
            Err(StoreError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_watch_emits_bulk_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("categories.json");
        fs::write(&path, "[]").unwrap();

        let notifier = Arc::new(CategoryChangeNotifier::default());
        let mut rx = notifier.subscribe();
        let store = FileCategoryStore::new(&path);
        let handle = store.watch(notifier.clone(), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(&path, r#"[{"name": "public"}]"#).unwrap();

        let change = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for change")
            .unwrap();
        assert_eq!(change, CategoryChange::BulkReload);

        handle.stop().await;
    }
}
