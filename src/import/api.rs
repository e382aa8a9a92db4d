//! Typed wrappers around the import service endpoints.
//!
//! Every path is relative to the client's base URL:
//!
//! | Operation        | Request                                  |
//! |------------------|------------------------------------------|
//! | list             | `GET buyer-orgs?an={account}`            |
//! | details          | `GET buyer-orgs/{importId}`              |
//! | upload           | `POST buyer-orgs` (multipart, `file`)    |
//! | start validation | `POST buyer-orgs/validate/{importId}`    |
//! | start import     | `POST buyer-orgs/{importId}`             |

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::import::client::ImportServiceClient;
use crate::import::models::ImportDetails;
use crate::import::BUYER_ORGS_PATH;

/// Multipart field name expected by the upload endpoint.
const UPLOAD_FIELD: &str = "file";

// ─────────────────────────────────────────────────────────────────────────────
// Upload Input
// ─────────────────────────────────────────────────────────────────────────────

/// Where the uploaded bytes come from.
#[derive(Clone)]
pub enum UploadSource {
    Bytes(Vec<u8>),
    /// Streamed from disk without loading it into memory.
    Path(PathBuf),
}

/// A spreadsheet selected for upload.
#[derive(Clone)]
pub struct UploadFile {
    /// Name sent to the server and echoed back in outcomes.
    pub file_name: String,
    pub source: UploadSource,
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            UploadSource::Bytes(bytes) => format!("{} bytes in memory", bytes.len()),
            UploadSource::Path(_) => "file on disk".to_string(),
        };
        f.debug_struct("UploadFile")
            .field("file_name", &self.file_name)
            .field("source", &source)
            .finish()
    }
}

impl UploadFile {
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            source: UploadSource::Bytes(bytes),
        }
    }

    /// Uses the path's final component as the file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            file_name,
            source: UploadSource::Path(path),
        }
    }

    /// Builds the multipart form, returning it with the body size in bytes.
    async fn into_form(self) -> Result<(Form, u64), AppError> {
        let (part, size) = match self.source {
            UploadSource::Bytes(bytes) => {
                let size = bytes.len() as u64;
                (Part::bytes(bytes), size)
            }
            UploadSource::Path(path) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to open upload file: {}", e))
                })?;
                let size = file
                    .metadata()
                    .await
                    .map_err(|e| {
                        AppError::InvalidInput(format!("Failed to stat upload file: {}", e))
                    })?
                    .len();
                let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
                (Part::stream_with_length(body, size), size)
            }
        };

        let part = part.file_name(self.file_name);
        Ok((Form::new().part(UPLOAD_FIELD, part), size))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkImportApi
// ─────────────────────────────────────────────────────────────────────────────

/// Endpoint wrappers over an `ImportServiceClient`.
#[derive(Debug, Clone)]
pub struct BulkImportApi {
    client: ImportServiceClient,
}

impl BulkImportApi {
    pub fn new(client: ImportServiceClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ImportConfig) -> Result<Self, AppError> {
        Ok(Self::new(ImportServiceClient::from_config(config)?))
    }

    pub fn client(&self) -> &ImportServiceClient {
        &self.client
    }

    /// Lists every import the server knows for `account`.
    pub async fn list_imports(&self, account: &str) -> Result<Vec<ImportDetails>, AppError> {
        self.client
            .get_json(BUYER_ORGS_PATH, &[("an", account)])
            .await
    }

    pub async fn get_import_details(&self, import_id: &str) -> Result<ImportDetails, AppError> {
        let path = self.details_path(import_id)?;
        self.client.get_json(&path, &[]).await
    }

    /// Uploads a spreadsheet and returns the import the server created for it.
    pub async fn upload_file(&self, file: UploadFile) -> Result<ImportDetails, AppError> {
        let file_name = file.file_name.clone();
        let (form, size) = file.into_form().await?;

        info!(
            "[IMPORT-UPLOAD] POST {} ({} bytes, {} chars in name)",
            BUYER_ORGS_PATH,
            size,
            file_name.chars().count()
        );

        let details: ImportDetails = self.client.post_multipart(BUYER_ORGS_PATH, form).await?;

        info!(
            "[IMPORT-UPLOAD] Created import {}",
            redact_id(&details.import_id)
        );
        Ok(details)
    }

    /// Asks the server to validate an uploaded file.
    pub async fn start_validation(&self, import_id: &str) -> Result<(), AppError> {
        let path = self
            .client
            .segment_path(&[BUYER_ORGS_PATH, "validate", checked_id(import_id)?])?;
        self.client.post_json::<()>(&path, None).await
    }

    /// Starts the bulk import of a validated file.
    pub async fn start_import(&self, import_id: &str) -> Result<(), AppError> {
        let path = self.details_path(import_id)?;
        self.client.post_json::<()>(&path, None).await
    }

    /// Downloads the validation error report behind `errorDownloadLink`.
    pub async fn download_validation_report(
        &self,
        link: &str,
        output_path: &Path,
    ) -> Result<u64, AppError> {
        if link.trim().is_empty() {
            return Err(AppError::InvalidInput("Report link must not be empty".into()));
        }
        self.client.download_to(link, output_path).await
    }

    fn details_path(&self, import_id: &str) -> Result<String, AppError> {
        self.client
            .segment_path(&[BUYER_ORGS_PATH, checked_id(import_id)?])
    }
}

/// Import ids are opaque; they are percent-encoded into a single segment.
fn checked_id(import_id: &str) -> Result<&str, AppError> {
    if import_id.trim().is_empty() {
        return Err(AppError::InvalidInput("Import id must not be empty".into()));
    }
    Ok(import_id)
}

/// Shortens an import id for logs.
pub(crate) fn redact_id(id: &str) -> String {
    if id.chars().count() > 8 {
        format!("{}...", id.chars().take(8).collect::<String>())
    } else {
        id.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits for Testing
// ─────────────────────────────────────────────────────────────────────────────

/// Import service operations, allowing test fakes.
pub trait ImportServiceOps: Send + Sync + Clone {
    fn list_imports<'a>(
        &'a self,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ImportDetails>, AppError>> + Send + 'a>>;

    fn get_import_details<'a>(
        &'a self,
        import_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ImportDetails, AppError>> + Send + 'a>>;

    fn upload_file(
        &self,
        file: UploadFile,
    ) -> Pin<Box<dyn Future<Output = Result<ImportDetails, AppError>> + Send + '_>>;

    fn start_validation<'a>(
        &'a self,
        import_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    fn start_import<'a>(
        &'a self,
        import_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;
}

impl ImportServiceOps for BulkImportApi {
    fn list_imports<'a>(
        &'a self,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ImportDetails>, AppError>> + Send + 'a>> {
        Box::pin(BulkImportApi::list_imports(self, account))
    }

    fn get_import_details<'a>(
        &'a self,
        import_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ImportDetails, AppError>> + Send + 'a>> {
        Box::pin(BulkImportApi::get_import_details(self, import_id))
    }

    fn upload_file(
        &self,
        file: UploadFile,
    ) -> Pin<Box<dyn Future<Output = Result<ImportDetails, AppError>> + Send + '_>> {
        Box::pin(BulkImportApi::upload_file(self, file))
    }

    fn start_validation<'a>(
        &'a self,
        import_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(BulkImportApi::start_validation(self, import_id))
    }

    fn start_import<'a>(
        &'a self,
        import_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(BulkImportApi::start_import(self, import_id))
    }
}
