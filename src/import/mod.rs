//! Bulk import lifecycle for buyer organization data.
//!
//! - **Transport** (`client`): HTTP client bound to the import service base URL
//! - **Endpoints** (`api`): list, details, upload, start-validation, start-import
//! - **Latest import** (`list`): most recent active import for an account
//! - **Polling** (`poller`): import details polled until a terminal state
//! - **Orchestration** (`orchestrator`): upload → validate → poll → outcome
//! - **Reports** (`report`): per-category success/error percentages
//! - **Metrics** (`metrics`): best-effort upload events

use serde::{Deserialize, Serialize};

pub mod api;
pub mod client;
#[cfg(test)]
mod fakes;
pub mod list;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod poller;
pub mod report;

pub use api::{BulkImportApi, ImportServiceOps, UploadFile, UploadSource};
pub use client::{ImportServiceClient, LoggingMode};
pub use list::{get_bulk_import_list, latest_active_import, LatestImportMonitor};
pub use metrics::{MetricsReporter, NoopMetrics, UploadEvent};
pub use models::{ImportDetails, ImportOutcome, ImportStatus, ImportSummary};
pub use orchestrator::{UploadOrchestrator, UploadPhase, UploadSession};
pub use poller::{ImportStatusSource, Subscription, TimerStatusPoller};
pub use report::{build_report, ReportBreakdown};

/// Path segment shared by every import endpoint.
pub const BUYER_ORGS_PATH: &str = "buyer-orgs";

/// Server-side state of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportState {
    ReadyToImport,
    InProgress,
    InValidation,
    Completed,
    CompletedWithError,
    ValidationFailed,
    Failed,
}

/// How the details poller treats a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePhase {
    /// Keep polling.
    Pending,
    /// Stop and report success.
    Succeeded,
    /// Stop and report an error.
    Failed,
}

impl ImportState {
    pub fn phase(&self) -> StatePhase {
        match self {
            ImportState::InValidation | ImportState::InProgress => StatePhase::Pending,
            ImportState::ReadyToImport | ImportState::Completed => StatePhase::Succeeded,
            ImportState::ValidationFailed
            | ImportState::CompletedWithError
            | ImportState::Failed => StatePhase::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase() != StatePhase::Pending
    }

    /// Status shown in the latest-import alert. `None` for states the alert ignores.
    pub fn list_status(&self) -> Option<ImportStatus> {
        match self {
            ImportState::InProgress => Some(ImportStatus::Pending),
            ImportState::Completed => Some(ImportStatus::Success),
            ImportState::CompletedWithError => Some(ImportStatus::Error),
            ImportState::ReadyToImport
            | ImportState::InValidation
            | ImportState::ValidationFailed
            | ImportState::Failed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportState::ReadyToImport => "ReadyToImport",
            ImportState::InProgress => "InProgress",
            ImportState::InValidation => "InValidation",
            ImportState::Completed => "Completed",
            ImportState::CompletedWithError => "CompletedWithError",
            ImportState::ValidationFailed => "ValidationFailed",
            ImportState::Failed => "Failed",
        }
    }
}
