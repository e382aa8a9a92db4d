//! Best-effort upload metrics.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::import::models::ImportErrorCode;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum UploadEvent {
    #[serde(rename_all = "camelCase")]
    UploadStarted { session_id: Uuid, file_name: String },
    #[serde(rename_all = "camelCase")]
    UploadFinished {
        session_id: Uuid,
        file_name: String,
        success: bool,
        error: Option<ImportErrorCode>,
        duration_ms: u64,
    },
}

/// Sink for upload events. Failures never affect the upload flow.
pub trait MetricsReporter: Send + Sync {
    fn report<'a>(
        &'a self,
        event: &'a UploadEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsReporter for NoopMetrics {
    fn report<'a>(
        &'a self,
        _event: &'a UploadEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

pub(crate) async fn report_best_effort(reporter: &dyn MetricsReporter, event: UploadEvent) {
    if let Err(e) = reporter.report(&event).await {
        warn!("[IMPORT-UPLOAD] Metrics report failed: {}", e);
    }
}
