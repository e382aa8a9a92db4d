//! Latest active import for an account.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::import::api::{redact_id, ImportServiceOps};
use crate::import::models::{ImportDetails, ImportFileRef, ImportSummary};

/// Most recent import among the states the alert cares about.
///
/// Imports without `importedAt` sort last. Ties keep server order.
pub fn latest_active_import(imports: Vec<ImportDetails>) -> Option<ImportSummary> {
    let mut summaries: Vec<ImportSummary> = imports
        .into_iter()
        .filter_map(|details| {
            let status = details.import_state.list_status()?;
            Some(ImportSummary {
                progress: details.clamped_percentage(),
                import_id: details.import_id,
                status,
                imported_at: details.imported_at,
                file: ImportFileRef {
                    name: details.file_name,
                },
            })
        })
        .collect();

    summaries.sort_by(|a, b| b.imported_at.cmp(&a.imported_at));
    summaries.into_iter().next()
}

/// Fetches the import list for `account` and returns at most one entry.
pub async fn get_bulk_import_list<S: ImportServiceOps>(
    service: &S,
    account: &str,
) -> Result<Vec<ImportSummary>, AppError> {
    let account = account.trim();
    if account.is_empty() {
        return Err(AppError::InvalidInput("account must not be empty".into()));
    }

    let imports = service.list_imports(account).await?;
    let total = imports.len();
    let latest = latest_active_import(imports);

    debug!(
        "[IMPORT-LIST] {} imports listed, latest: {}",
        total,
        latest
            .as_ref()
            .map(|s| redact_id(&s.import_id))
            .unwrap_or_else(|| "-".into())
    );

    Ok(latest.into_iter().collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// LatestImportMonitor
// ─────────────────────────────────────────────────────────────────────────────

/// Background refresh of the latest-import alert.
///
/// Polls immediately and then every `interval`. The observer sees the first
/// result and every later change. A non-transient error (4xx included)
/// stops the monitor for good; transient errors are logged and skipped.
pub struct LatestImportMonitor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LatestImportMonitor {
    /// Must be called within a tokio runtime.
    pub fn spawn<S, F>(
        service: S,
        account: impl Into<String>,
        interval: Duration,
        on_change: F,
    ) -> Self
    where
        S: ImportServiceOps + 'static,
        F: FnMut(Option<ImportSummary>) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let account = account.into();
        let handle = tokio::spawn(monitor_loop(
            service,
            account,
            interval,
            cancel.clone(),
            on_change,
        ));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Monitors `config.account` every `config.list_poll_interval`.
    pub fn from_config<S, F>(
        service: S,
        config: &ImportConfig,
        on_change: F,
    ) -> Result<Self, AppError>
    where
        S: ImportServiceOps + 'static,
        F: FnMut(Option<ImportSummary>) + Send + 'static,
    {
        let account = config
            .account
            .clone()
            .ok_or_else(|| AppError::Config("B2B_IMPORT_ACCOUNT is not set".into()))?;
        Ok(Self::spawn(service, account, config.list_poll_interval, on_change))
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .handle
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false)
    }

    /// Waits for the monitor task to exit.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for LatestImportMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn monitor_loop<S, F>(
    service: S,
    account: String,
    interval: Duration,
    cancel: CancellationToken,
    mut on_change: F,
) where
    S: ImportServiceOps,
    F: FnMut(Option<ImportSummary>) + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last: Option<Option<ImportSummary>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = get_bulk_import_list(&service, &account) => result,
        };

        match result {
            Ok(list) => {
                let latest = list.into_iter().next();
                if last.as_ref() != Some(&latest) {
                    if cancel.is_cancelled() {
                        return;
                    }
                    on_change(latest.clone());
                    last = Some(latest);
                }
            }
            Err(e) if e.is_transient() => {
                warn!("[IMPORT-LIST] Refresh failed, retrying next tick: {}", e);
            }
            Err(e) => {
                match e.status() {
                    Some(status) if e.is_client_error() => warn!(
                        "[IMPORT-LIST] Import list refused with HTTP {}, monitoring stopped",
                        status
                    ),
                    _ => info!("[IMPORT-LIST] Monitoring stopped: {}", e),
                }
                cancel.cancel();
                return;
            }
        }
    }
}
