//! Wire and outcome types for the import service.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::import::ImportState;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types (match the import service JSON)
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of one import as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDetails {
    pub import_id: String,
    #[serde(default)]
    pub file_name: String,
    pub import_state: ImportState,
    /// Server sends a string; never clamped here.
    #[serde(default, deserialize_with = "de_percentage")]
    pub percentage: f64,
    #[serde(default)]
    pub import_result: Option<ImportResult>,
    #[serde(default)]
    pub validation_result: Option<ValidationResult>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub last_update_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub imported_at: Option<DateTime<Utc>>,
}

impl ImportDetails {
    /// Progress clamped to `[0, 100]` for display.
    pub fn clamped_percentage(&self) -> f64 {
        if self.percentage.is_nan() {
            return 0.0;
        }
        self.percentage.clamp(0.0, 100.0)
    }

    /// Link to the downloadable validation error report, if any.
    pub fn error_download_link(&self) -> Option<&str> {
        self.validation_result
            .as_ref()
            .and_then(|v| v.report_download_link.as_deref())
    }
}

/// Row counts per imported category, present once processing completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    #[serde(default)]
    pub imports: Vec<CategoryImportResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryImportResult {
    pub name: String,
    #[serde(default)]
    pub imported_rows: u64,
    #[serde(default)]
    pub rows_with_error: u64,
}

/// Present when validation fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    #[serde(default)]
    pub validation_result: Vec<CategoryValidationResult>,
    #[serde(default)]
    pub report_download_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryValidationResult {
    pub name: String,
    #[serde(default)]
    pub invalid_rows: u64,
}

/// Error body returned by a rejected upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadErrorPayload {
    pub error: ImportErrorCode,
    #[serde(default)]
    pub line_errors: Option<Vec<Value>>,
}

/// Error codes surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportErrorCode {
    InvalidFileType,
    InvalidFileSize,
    FieldValidationError,
    /// Any failure without a recognised server code.
    #[serde(other)]
    RequestFailed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Latest-Import Alert Types
// ─────────────────────────────────────────────────────────────────────────────

/// Status shown in the latest-import alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFileRef {
    pub name: String,
}

/// Simplified view of the most recent import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub import_id: String,
    pub progress: f64,
    pub status: ImportStatus,
    pub imported_at: Option<DateTime<Utc>>,
    pub file: ImportFileRef,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome Types
// ─────────────────────────────────────────────────────────────────────────────

/// Details snapshot handed to the presentation layer on success.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub import_id: String,
    pub file_name: String,
    pub import_state: ImportState,
    /// Stringified server percentage.
    pub percentage: String,
    pub import_result: Option<ImportResult>,
    pub validation_result: Option<ValidationResult>,
    pub last_update_date: Option<DateTime<Utc>>,
    pub imported_at: Option<DateTime<Utc>>,
}

impl From<&ImportDetails> for FileData {
    fn from(details: &ImportDetails) -> Self {
        Self {
            import_id: details.import_id.clone(),
            file_name: details.file_name.clone(),
            import_state: details.import_state,
            percentage: details.percentage.to_string(),
            import_result: details.import_result.clone(),
            validation_result: details.validation_result.clone(),
            last_update_date: details.last_update_date,
            imported_at: details.imported_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessData {
    pub file_data: FileData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportErrorData {
    pub error: ImportErrorCode,
    pub error_download_link: Option<String>,
    pub validation_result: Option<ValidationResult>,
    pub import_result: Option<ImportResult>,
    pub line_errors: Option<Vec<Value>>,
    pub message: Option<String>,
    pub file_name: String,
}

impl ImportErrorData {
    /// Error data for a failure that has no import details behind it.
    pub fn request_failed(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ImportErrorCode::RequestFailed,
            error_download_link: None,
            validation_result: None,
            import_result: None,
            line_errors: None,
            message: Some(message.into()),
            file_name: file_name.into(),
        }
    }
}

/// Terminal result of an upload or polling session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImportOutcome {
    Success {
        data: SuccessData,
    },
    Error {
        #[serde(rename = "showReport")]
        show_report: bool,
        data: ImportErrorData,
    },
}

impl ImportOutcome {
    pub fn success(details: &ImportDetails) -> Self {
        ImportOutcome::Success {
            data: SuccessData {
                file_data: FileData::from(details),
            },
        }
    }

    /// Error outcome for a details snapshot in a failed state.
    pub fn import_failed(details: &ImportDetails) -> Self {
        ImportOutcome::Error {
            show_report: details.import_state == ImportState::ValidationFailed,
            data: ImportErrorData {
                error: ImportErrorCode::FieldValidationError,
                error_download_link: details.error_download_link().map(str::to_string),
                validation_result: details.validation_result.clone(),
                import_result: details.import_result.clone(),
                line_errors: None,
                message: None,
                file_name: details.file_name.clone(),
            },
        }
    }

    pub fn error(data: ImportErrorData) -> Self {
        ImportOutcome::Error {
            show_report: false,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ImportOutcome::Success { .. })
    }

    pub fn file_name(&self) -> &str {
        match self {
            ImportOutcome::Success { data } => &data.file_data.file_name,
            ImportOutcome::Error { data, .. } => &data.file_name,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lenient Deserializers
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts `"42.5"`, `42.5` or `null`. Anything unparseable becomes `0.0`.
fn de_percentage<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()).unwrap_or(0.0))
}

/// Accepts RFC 3339 or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC).
fn de_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_timestamp(&s)))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
