//! Upload session orchestration: upload → validate → poll → outcome.
//!
//! Each session runs as one spawned task. Its phases are strictly ordered:
//! the validation request is only sent after the upload succeeded, and the
//! status subscription only starts after validation was accepted. The
//! completion callback runs exactly once unless the session is cancelled,
//! in which case it never runs.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::import::api::{redact_id, BulkImportApi, ImportServiceOps, UploadFile};
use crate::import::metrics::{report_best_effort, MetricsReporter, NoopMetrics, UploadEvent};
use crate::import::models::{ImportErrorData, ImportOutcome, UploadErrorPayload};
use crate::import::poller::{DeliverySlot, ImportStatusSource, TimerStatusPoller};

// ─────────────────────────────────────────────────────────────────────────────
// Session Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPhase {
    Uploading,
    Validating,
    Polling,
    Finished,
}

/// Handle to a running upload session. Dropping it cancels the session.
pub struct UploadSession {
    id: Uuid,
    file_name: String,
    phase: Arc<Mutex<UploadPhase>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl UploadSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn phase(&self) -> UploadPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tears the session down. The completion callback will not run unless
    /// its delivery had already started.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for the session task to exit.
    pub async fn finished(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UploadOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct UploadOrchestrator<S, P> {
    service: S,
    status_source: Arc<P>,
    metrics: Arc<dyn MetricsReporter>,
}

impl UploadOrchestrator<BulkImportApi, TimerStatusPoller<BulkImportApi>> {
    /// Orchestrator backed by the HTTP service and the timer poller.
    pub fn from_config(config: &ImportConfig) -> Result<Self, AppError> {
        let api = BulkImportApi::from_config(config)?;
        let poller = TimerStatusPoller::new(api.clone(), config.poll_interval)
            .with_max_duration(config.max_poll_duration);
        Ok(Self::new(api, poller))
    }
}

impl<S, P> UploadOrchestrator<S, P>
where
    S: ImportServiceOps + 'static,
    P: ImportStatusSource + 'static,
{
    pub fn new(service: S, status_source: P) -> Self {
        Self {
            service,
            status_source: Arc::new(status_source),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsReporter>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Starts an upload session in the background.
    ///
    /// `on_upload_finished` receives the terminal outcome once. Must be called
    /// within a tokio runtime.
    pub fn start<F>(&self, file: UploadFile, on_upload_finished: F) -> UploadSession
    where
        F: FnOnce(ImportOutcome) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let phase = Arc::new(Mutex::new(UploadPhase::Uploading));
        let file_name = file.file_name.clone();

        let run = SessionRun {
            id,
            service: self.service.clone(),
            status_source: self.status_source.clone(),
            metrics: self.metrics.clone(),
            phase: phase.clone(),
            slot: DeliverySlot::new(Box::new(on_upload_finished), cancel.clone()),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run.execute(file));

        UploadSession {
            id,
            file_name,
            phase,
            cancel,
            handle: Some(handle),
        }
    }

    /// Runs a whole session and returns its outcome.
    pub async fn upload(&self, file: UploadFile) -> Result<ImportOutcome, AppError> {
        let (tx, rx) = oneshot::channel();
        let _session = self.start(file, move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.map_err(|_| AppError::Cancelled)
    }

    /// Starts the bulk import of a file whose validation succeeded.
    pub async fn start_import(&self, import_id: &str) -> Result<(), AppError> {
        self.service.start_import(import_id).await?;
        info!("[IMPORT-UPLOAD] Import {} started", redact_id(import_id));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Task
// ─────────────────────────────────────────────────────────────────────────────

struct SessionRun<S, P> {
    id: Uuid,
    service: S,
    status_source: Arc<P>,
    metrics: Arc<dyn MetricsReporter>,
    phase: Arc<Mutex<UploadPhase>>,
    slot: DeliverySlot,
    cancel: CancellationToken,
}

impl<S: ImportServiceOps, P: ImportStatusSource> SessionRun<S, P> {
    async fn execute(self, file: UploadFile) {
        let started = Instant::now();
        let file_name = file.file_name.clone();
        report_best_effort(
            self.metrics.as_ref(),
            UploadEvent::UploadStarted {
                session_id: self.id,
                file_name: file_name.clone(),
            },
        )
        .await;

        let Some(outcome) = self.drive(file, &file_name).await else {
            debug!("[IMPORT-UPLOAD] Session {} cancelled", self.short_id());
            return;
        };
        self.set_phase(UploadPhase::Finished);

        let error = match &outcome {
            ImportOutcome::Success { .. } => None,
            ImportOutcome::Error { data, .. } => Some(data.error),
        };
        info!(
            "[IMPORT-UPLOAD] Session {} finished in {}ms (error: {:?})",
            self.short_id(),
            started.elapsed().as_millis(),
            error
        );
        report_best_effort(
            self.metrics.as_ref(),
            UploadEvent::UploadFinished {
                session_id: self.id,
                file_name,
                success: error.is_none(),
                error,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        )
        .await;

        self.slot.deliver(outcome);
    }

    /// Returns `None` when the session was cancelled.
    async fn drive(&self, file: UploadFile, file_name: &str) -> Option<ImportOutcome> {
        let uploaded = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            result = self.service.upload_file(file) => result,
        };
        let details = match uploaded {
            Ok(details) => details,
            Err(e) => {
                warn!("[IMPORT-UPLOAD] Session {} upload rejected: {}", self.short_id(), e);
                return Some(upload_error_outcome(&e, file_name));
            }
        };
        let import_id = details.import_id;

        if self.cancel.is_cancelled() {
            return None;
        }
        self.set_phase(UploadPhase::Validating);
        let validation = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            result = self.service.start_validation(&import_id) => result,
        };
        if let Err(e) = validation {
            warn!(
                "[IMPORT-UPLOAD] Validation of import {} could not start: {}",
                redact_id(&import_id),
                e
            );
            return Some(ImportOutcome::error(ImportErrorData::request_failed(
                file_name,
                e.to_string(),
            )));
        }

        if self.cancel.is_cancelled() {
            return None;
        }
        self.set_phase(UploadPhase::Polling);
        let (tx, rx) = oneshot::channel();
        let subscription = self.status_source.subscribe(
            &import_id,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );

        let received = tokio::select! {
            _ = self.cancel.cancelled() => {
                subscription.unsubscribe();
                return None;
            }
            received = rx => received,
        };
        drop(subscription);

        let outcome = match received {
            Ok(outcome) => outcome,
            Err(_) => ImportOutcome::error(ImportErrorData::request_failed(
                file_name,
                "status updates ended without a result",
            )),
        };
        Some(with_file_name(outcome, file_name))
    }

    fn set_phase(&self, phase: UploadPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn short_id(&self) -> String {
        redact_id(&self.id.to_string())
    }
}

/// Outcome for a rejected upload. Uses the server's error code and line
/// errors when the body carries them.
fn upload_error_outcome(error: &AppError, file_name: &str) -> ImportOutcome {
    if let AppError::ImportService { body, .. } = error {
        if let Ok(payload) = serde_json::from_str::<UploadErrorPayload>(body) {
            return ImportOutcome::error(ImportErrorData {
                error: payload.error,
                error_download_link: None,
                validation_result: None,
                import_result: None,
                line_errors: payload.line_errors,
                message: None,
                file_name: file_name.to_string(),
            });
        }
    }
    ImportOutcome::error(ImportErrorData::request_failed(file_name, error.to_string()))
}

/// Fills in the original file name when the status source had none.
fn with_file_name(mut outcome: ImportOutcome, file_name: &str) -> ImportOutcome {
    let slot = match &mut outcome {
        ImportOutcome::Success { data } => &mut data.file_data.file_name,
        ImportOutcome::Error { data, .. } => &mut data.file_name,
    };
    if slot.is_empty() {
        *slot = file_name.to_string();
    }
    outcome
}
