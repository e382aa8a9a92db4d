//! Session flags persisted in a JSON key/value file.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::import::models::ImportSummary;

pub const IS_AUTHENTICATED_KEY: &str = "isAuthenticated";
pub const DISMISSED_IMPORT_ALERTS_KEY: &str = "dismissedImportAlerts";

type Entries = Map<String, Value>;

/// JSON object file. Writes go through a temp file and rename.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `config.session_path`.
    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new(config.session_path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all entries. A missing file is empty; an unreadable one is
    /// logged and treated as empty.
    pub async fn load(&self) -> Result<Entries, AppError> {
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let raw = match std::fs::read(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
                Err(e) => {
                    return Err(AppError::Storage(format!("Failed to read session file: {e}")))
                }
            };

            match serde_json::from_slice::<Value>(&raw) {
                Ok(Value::Object(entries)) => Ok(entries),
                Ok(_) | Err(_) => {
                    warn!("[SESSION] Session file is not a JSON object, starting empty");
                    Ok(Entries::new())
                }
            }
        })
        .await
        .map_err(|e| AppError::Internal(format!("Session load task failed: {e}")))?
    }

    pub async fn save(&self, entries: &Entries) -> Result<(), AppError> {
        let path = self.path.clone();
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| AppError::Internal(format!("Failed to encode session: {e}")))?;

        tokio::task::spawn_blocking(move || {
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&parent).map_err(|e| {
                AppError::Storage(format!("Failed to create session directory: {e}"))
            })?;

            let mut temp_file = tempfile::NamedTempFile::new_in(&parent)
                .map_err(|e| AppError::Storage(format!("Failed to create temp file: {e}")))?;
            temp_file
                .write_all(&bytes)
                .map_err(|e| AppError::Storage(format!("Failed to write session: {e}")))?;
            temp_file
                .as_file()
                .sync_all()
                .map_err(|e| AppError::Storage(format!("Failed to sync session: {e}")))?;
            temp_file
                .persist(&path)
                .map_err(|e| AppError::Storage(format!("Failed to persist session: {e}")))?;

            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Session save task failed: {e}")))??;

        debug!("[SESSION] Saved {} entries", entries.len());
        Ok(())
    }
}

/// Session state handed to consumers explicitly.
///
/// Keeps an in-memory copy of the store. Every mutation is written through
/// before the copy changes, so a failed write leaves both untouched.
#[derive(Debug)]
pub struct SessionContext {
    store: SessionStore,
    entries: RwLock<Entries>,
}

impl SessionContext {
    pub async fn open(store: SessionStore) -> Result<Self, AppError> {
        let entries = store.load().await?;
        Ok(Self {
            store,
            entries: RwLock::new(entries),
        })
    }

    /// Opens the session file named by `config.session_path`.
    pub async fn from_config(config: &ImportConfig) -> Result<Self, AppError> {
        Self::open(SessionStore::from_config(config)).await
    }

    /// Re-reads the file, picking up changes made by other processes.
    pub async fn refresh(&self) -> Result<(), AppError> {
        let fresh = self.store.load().await?;
        *self.entries.write().await = fresh;
        Ok(())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.entries
            .read()
            .await
            .get(IS_AUTHENTICATED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub async fn set_authenticated(&self, authenticated: bool) -> Result<(), AppError> {
        self.update(|entries| {
            entries.insert(IS_AUTHENTICATED_KEY.into(), Value::Bool(authenticated));
        })
        .await
    }

    pub async fn dismissed_alerts(&self) -> Vec<String> {
        dismissed_ids(&*self.entries.read().await)
    }

    pub async fn is_alert_dismissed(&self, import_id: &str) -> bool {
        dismissed_ids(&*self.entries.read().await)
            .iter()
            .any(|id| id == import_id)
    }

    /// Hides the alert for `import_id`. Dismissing twice is a no-op.
    pub async fn dismiss_alert(&self, import_id: &str) -> Result<(), AppError> {
        if self.is_alert_dismissed(import_id).await {
            return Ok(());
        }
        let import_id = import_id.to_string();
        self.update(move |entries| {
            let mut ids = dismissed_ids(entries);
            ids.push(import_id);
            entries.insert(
                DISMISSED_IMPORT_ALERTS_KEY.into(),
                Value::Array(ids.into_iter().map(Value::String).collect()),
            );
        })
        .await
    }

    /// The latest-import alert to show, or `None` if it was dismissed.
    pub async fn visible_alert(&self, summary: Option<ImportSummary>) -> Option<ImportSummary> {
        let summary = summary?;
        if self.is_alert_dismissed(&summary.import_id).await {
            None
        } else {
            Some(summary)
        }
    }

    async fn update<F>(&self, mutate: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut Entries),
    {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        mutate(&mut next);
        self.store.save(&next).await?;
        *entries = next;
        Ok(())
    }
}

/// Dismissed ids in stored order. Non-string entries are skipped.
fn dismissed_ids(entries: &Entries) -> Vec<String> {
    entries
        .get(DISMISSED_IMPORT_ALERTS_KEY)
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::models::{ImportFileRef, ImportStatus};
    use tempfile::TempDir;

    fn summary(import_id: &str) -> ImportSummary {
        ImportSummary {
            import_id: import_id.into(),
            progress: 100.0,
            status: ImportStatus::Success,
            imported_at: None,
            file: ImportFileRef {
                name: "orgs.xlsx".into(),
            },
        }
    }

    async fn open_in(dir: &TempDir) -> SessionContext {
        SessionContext::open(SessionStore::new(dir.path().join("data").join("session.json")))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let session = open_in(&dir).await;

        assert!(!session.is_authenticated().await);
        assert!(session.dismissed_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn mutations_are_written_through() {
        let dir = TempDir::new().unwrap();
        let session = open_in(&dir).await;

        session.set_authenticated(true).await.unwrap();
        session.dismiss_alert("imp-1").await.unwrap();
        session.dismiss_alert("imp-1").await.unwrap();

        let reopened = open_in(&dir).await;
        assert!(reopened.is_authenticated().await);
        assert_eq!(reopened.dismissed_alerts().await, vec!["imp-1".to_string()]);

        let raw = std::fs::read_to_string(dir.path().join("data").join("session.json")).unwrap();
        let json: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["isAuthenticated"], true);
        assert_eq!(json["dismissedImportAlerts"], serde_json::json!(["imp-1"]));
    }

    #[tokio::test]
    async fn from_config_uses_session_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("session.json");
        let mut config = ImportConfig::with_base_url("http://127.0.0.1:9000").unwrap();
        config.session_path = path.clone();

        assert_eq!(SessionStore::from_config(&config).path(), path.as_path());

        let session = SessionContext::from_config(&config).await.unwrap();
        session.set_authenticated(true).await.unwrap();

        let json: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["isAuthenticated"], true);
    }

    #[tokio::test]
    async fn refresh_picks_up_external_changes() {
        let dir = TempDir::new().unwrap();
        let session = open_in(&dir).await;
        assert!(!session.is_authenticated().await);

        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(
            dir.path().join("data").join("session.json"),
            r#"{"isAuthenticated": true, "theme": "dark"}"#,
        )
        .unwrap();
        session.refresh().await.unwrap();

        assert!(session.is_authenticated().await);
    }

    #[tokio::test]
    async fn unrelated_keys_survive_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"theme": "dark"}"#).unwrap();

        let session = SessionContext::open(SessionStore::new(&path)).await.unwrap();
        session.dismiss_alert("imp-2").await.unwrap();

        let json: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["theme"], "dark");
        assert_eq!(json["dismissedImportAlerts"], serde_json::json!(["imp-2"]));
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let session = SessionContext::open(SessionStore::new(&path)).await.unwrap();

        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn dismissed_alert_is_hidden() {
        let dir = TempDir::new().unwrap();
        let session = open_in(&dir).await;
        session.dismiss_alert("imp-1").await.unwrap();

        assert!(session.visible_alert(Some(summary("imp-1"))).await.is_none());
        assert_eq!(
            session.visible_alert(Some(summary("imp-2"))).await,
            Some(summary("imp-2"))
        );
        assert!(session.visible_alert(None).await.is_none());
    }

    #[tokio::test]
    async fn failed_write_leaves_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let session = SessionContext::open(SessionStore::new(&path)).await.unwrap();

        // A non-empty directory at the target path makes the rename fail.
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(matches!(
            session.set_authenticated(true).await,
            Err(AppError::Storage(_))
        ));
        assert!(!session.is_authenticated().await);
    }
}
