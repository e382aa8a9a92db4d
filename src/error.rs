use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "authorization:",
    "vtexidclientautcookie",
    "access_token",
    "appkey",
    "apptoken",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Transport ─────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx response from the import service, status and body unchanged.
    #[error("Import service returned HTTP {status}")]
    ImportService { status: u16, body: String },

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // ── Import flow ───────────────────────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("polling timed out")]
    PollingTimeout { import_id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ── Local state ───────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status of the failed request, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::ImportService { status, .. } => Some(*status),
            AppError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// True for 4xx answers other than 429. These stop any polling loop.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::ImportService { status, .. } if (400..500).contains(status))
    }

    /// True for failures that are worth another poll tick.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::ConnectionFailed(_) | AppError::RateLimited { .. } => true,
            AppError::ImportService { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Converts the error into a user-friendly presentation suitable for UI display.
    /// Never leaks secrets, tokens, or raw response bodies.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Transport ─────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the import service. Please check your connection.".into(),
                action: Some("Check network and retry".into()),
            },

            AppError::ImportService { status, .. } if *status == 401 || *status == 403 => {
                ErrorPresentation {
                    title: "Permission Denied".into(),
                    message: "You do not have permission to manage bulk imports.".into(),
                    action: Some("Log in with an account that can import organizations".into()),
                }
            }

            AppError::ImportService { status, .. } => ErrorPresentation {
                title: "Import Service Error".into(),
                message: format!("The import service rejected the request (HTTP {}).", status),
                action: Some("Try again".into()),
            },

            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("The import service is limiting requests. {}", wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            AppError::InvalidResponse(_) => ErrorPresentation {
                title: "Unexpected Response".into(),
                message: "The import service returned data this client does not understand.".into(),
                action: Some("Try again later".into()),
            },

            // ── Import flow ───────────────────────────────────────────────────
            AppError::Cancelled => ErrorPresentation {
                title: "Cancelled".into(),
                message: "The import was cancelled.".into(),
                action: None,
            },

            AppError::PollingTimeout { .. } => ErrorPresentation {
                title: "Import Still Running".into(),
                message: "The import did not finish in the expected time.".into(),
                action: Some("Check the import status later".into()),
            },

            AppError::InvalidInput(msg) => ErrorPresentation {
                title: "Invalid Input".into(),
                message: sanitize_message(msg, "The request contained invalid input."),
                action: None,
            },

            // ── Local state ───────────────────────────────────────────────────
            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: sanitize_message(msg, "The import client is misconfigured."),
                action: Some("Fix the configuration and restart".into()),
            },

            AppError::Storage(_) => ErrorPresentation {
                title: "Storage Error".into(),
                message: "Could not read or write local session data.".into(),
                action: Some("Try again".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
