//! Import service HTTP client with safe logging.

use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::Form;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;
use url::Url;

use crate::config::ImportConfig;
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all import service requests.
const CLIENT_USER_AGENT: &str = concat!("buyer-org-import/", env!("CARGO_PKG_VERSION"));

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "access_token",
    "token",
    "apptoken",
    "appkey",
    "authorization",
    "signature",
];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingMode {
    /// Log only the path component. Strips scheme, host, query, and fragment.
    /// Example: `/_v/import/buyer-orgs`
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    /// Example: `/_v/import/buyer-orgs?an=store&token=***`
    PathAndQueryRedacted,
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Sanitization
// ─────────────────────────────────────────────────────────────────────────────

fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// The result never contains the scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ImportServiceClient
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client bound to the import service base URL.
///
/// Returns the parsed body for 2xx answers and an error carrying the status
/// and body otherwise. It never retries.
#[derive(Clone)]
pub struct ImportServiceClient {
    http: reqwest::Client,
    /// Always ends with `/`.
    base_url: Url,
    auth_token: Option<SecretString>,
    logging_mode: LoggingMode,
}

impl std::fmt::Debug for ImportServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportServiceClient")
            .field("base_url", &self.base_url.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("logging_mode", &self.logging_mode)
            .finish()
    }
}

impl ImportServiceClient {
    /// Creates a client without credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `base_url` cannot be used as a base and
    /// `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, AppError> {
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(
                "Import service URL must be an absolute http(s) URL".into(),
            ));
        }
        let base_url = if base_url.path().ends_with('/') {
            base_url
        } else {
            let mut url = base_url;
            let path = format!("{}/", url.path());
            url.set_path(&path);
            url
        };

        Ok(Self {
            http: build_http_client(timeout)?,
            base_url,
            auth_token: None,
            logging_mode: LoggingMode::default(),
        })
    }

    /// Creates a client from the loaded configuration.
    pub fn from_config(config: &ImportConfig) -> Result<Self, AppError> {
        let mut client = Self::new(config.base_url.clone(), config.request_timeout)?
            .with_logging_mode(config.logging_mode);
        if let Some(token) = &config.auth_token {
            client = client.with_auth_token(token.clone());
        }
        Ok(client)
    }

    /// Attaches a bearer token to every request sent to the import service.
    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.auth_token = Some(token);
        self
    }

    /// Updates the logging mode for URL sanitization.
    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins a relative path (e.g. `buyer-orgs/abc`) onto the base URL.
    pub fn build_url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|_| AppError::Internal(format!("Invalid path: {}", path)))
    }

    /// Relative path built from percent-encoded `segments`, ready for the
    /// request methods. Each segment stays one path segment; empty, `.` and
    /// `..` segments are refused. The first segment must not contain `:`.
    pub fn segment_path(&self, segments: &[&str]) -> Result<String, AppError> {
        if segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == "..")
        {
            return Err(AppError::InvalidInput("Invalid path segment".into()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("Import service URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);

        url.path()
            .get(self.base_url.path().len()..)
            .map(str::to_string)
            .ok_or_else(|| AppError::Internal("Invalid path segments".into()))
    }

    /// GET `path` and parse the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let mut url = self.build_url(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        let request = self.http.get(url.as_str());
        let response = self.send(Method::GET, url, request).await?;
        parse_json(response).await
    }

    /// POST an optional JSON body to `path`, discarding the response body.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), AppError> {
        let url = self.build_url(path)?;
        let mut request = self.http.post(url.as_str());
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(Method::POST, url, request).await?;
        Ok(())
    }

    /// POST a multipart form to `path` and parse the JSON body.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<T, AppError> {
        let url = self.build_url(path)?;
        let request = self.http.post(url.as_str()).multipart(form);
        let response = self.send(Method::POST, url, request).await?;
        parse_json(response).await
    }

    /// Streams the document at `link` to `output_path`.
    ///
    /// Writes to a temporary file in the destination directory and renames it
    /// on success. The bearer token is only sent when `link` points at the
    /// import service origin.
    pub async fn download_to(&self, link: &str, output_path: &Path) -> Result<u64, AppError> {
        let url = match Url::parse(link) {
            Ok(url) => url,
            Err(_) => self
                .build_url(link)
                .map_err(|_| AppError::InvalidInput("Invalid download link".into()))?,
        };

        let request = self.http.get(url.as_str());
        let response = self.send(Method::GET, url, request).await?;

        let parent_dir = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        tokio::fs::create_dir_all(&parent_dir)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create output directory: {}", e)))?;

        let temp_file = tempfile::NamedTempFile::new_in(&parent_dir)
            .map_err(|e| AppError::Storage(format!("Failed to create temp file: {}", e)))?;
        let std_file = temp_file
            .reopen()
            .map_err(|e| AppError::Storage(format!("Failed to reopen temp file: {}", e)))?;
        let mut async_file = File::from_std(std_file);

        let mut stream = response.bytes_stream();
        let mut total_bytes = 0u64;
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|_| {
                AppError::ConnectionFailed("Error reading report download".to_string())
            })?;
            async_file
                .write_all(&chunk)
                .await
                .map_err(|e| AppError::Storage(format!("Error writing report: {}", e)))?;
            total_bytes += chunk.len() as u64;
        }

        async_file
            .flush()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to flush report: {}", e)))?;
        async_file
            .sync_all()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to sync report: {}", e)))?;

        temp_file
            .persist(output_path)
            .map_err(|e| AppError::Storage(format!("Failed to persist report: {}", e)))?;

        info!("[IMPORT-HTTP] report download complete: {} bytes", total_bytes);
        Ok(total_bytes)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base_url.origin()
    }

    /// Sends a request with timing and logging, and maps non-2xx answers.
    ///
    /// Never logs the Authorization header, request bodies, or response bodies.
    async fn send(
        &self,
        method: Method,
        url: Url,
        mut request: RequestBuilder,
    ) -> Result<Response, AppError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);

        if let Some(token) = &self.auth_token {
            if self.same_origin(&url) {
                request = request.bearer_auth(token.expose_secret());
            }
        }

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                let status = response.status();
                let x_request_id = response
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                info!(
                    "[IMPORT-HTTP] {} {} {} {}ms {}",
                    method,
                    sanitized_url,
                    status.as_u16(),
                    duration_ms,
                    x_request_id
                );

                if !status.is_success() {
                    return Err(parse_error_response(response, status).await);
                }
                Ok(response)
            }
            Err(_) => {
                // The raw reqwest error may contain the full URL.
                info!(
                    "[IMPORT-HTTP] {} {} FAILED {}ms",
                    method, sanitized_url, duration_ms
                );
                Err(AppError::ConnectionFailed(
                    "Connection to the import service failed".to_string(),
                ))
            }
        }
    }
}

/// Builds the configured HTTP client.
fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Maps a non-2xx response to an `AppError`, keeping status and body.
async fn parse_error_response(response: Response, status: StatusCode) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    let body = response.text().await.unwrap_or_default();
    AppError::ImportService {
        status: status.as_u16(),
        body,
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
    let bytes = response.bytes().await.map_err(|_| {
        AppError::ConnectionFailed("Error reading import service response".to_string())
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
