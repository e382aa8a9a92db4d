//! Client configuration loaded from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::AppError;
use crate::import::client::LoggingMode;

/// Default interval between import detail polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Default interval between latest-import list polls.
pub const DEFAULT_LIST_POLL_INTERVAL_MS: u64 = 5000;

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

const DEFAULT_SESSION_PATH: &str = "data/session.json";
const DEFAULT_LOG_FILTER: &str = "buyer_org_import=info";

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Base URL of the import service. Always ends with `/`.
    pub base_url: Url,
    pub account: Option<String>,
    pub auth_token: Option<SecretString>,
    pub poll_interval: Duration,
    pub list_poll_interval: Duration,
    /// `None` polls until the server reports a terminal state.
    pub max_poll_duration: Option<Duration>,
    pub request_timeout: Duration,
    pub logging_mode: LoggingMode,
    pub session_path: PathBuf,
    pub log_filter: String,
}

impl ImportConfig {
    /// Loads `.env` (if present) and reads configuration from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_base = lookup("B2B_IMPORT_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Config("B2B_IMPORT_BASE_URL is not set".into()))?;
        let base_url = parse_base_url(raw_base.trim())?;

        let poll_interval = Duration::from_millis(parse_positive(
            &lookup,
            "B2B_IMPORT_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        )?);
        let list_poll_interval = Duration::from_millis(parse_positive(
            &lookup,
            "B2B_IMPORT_LIST_POLL_INTERVAL_MS",
            DEFAULT_LIST_POLL_INTERVAL_MS,
        )?);
        let request_timeout = Duration::from_secs(parse_positive(
            &lookup,
            "B2B_IMPORT_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        let max_poll_duration =
            optional_positive(&lookup, "B2B_IMPORT_MAX_POLL_SECS")?.map(Duration::from_secs);

        let logging_mode = match lookup("B2B_IMPORT_LOG_QUERY").as_deref() {
            Some("1") | Some("true") => LoggingMode::PathAndQueryRedacted,
            _ => LoggingMode::PathOnly,
        };

        Ok(Self {
            base_url,
            account: lookup("B2B_IMPORT_ACCOUNT").filter(|v| !v.trim().is_empty()),
            auth_token: lookup("B2B_IMPORT_AUTH_TOKEN")
                .filter(|v| !v.is_empty())
                .map(SecretString::from),
            poll_interval,
            list_poll_interval,
            max_poll_duration,
            request_timeout,
            logging_mode,
            session_path: lookup("B2B_IMPORT_SESSION_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_PATH)),
            log_filter: lookup("B2B_IMPORT_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.into()),
        })
    }

    /// Configuration pointing at `base_url` with every other value at its default.
    pub fn with_base_url(base_url: &str) -> Result<Self, AppError> {
        let base = base_url.to_string();
        Self::from_lookup(move |key| (key == "B2B_IMPORT_BASE_URL").then(|| base.clone()))
    }
}

/// Parses the base URL and appends a trailing slash so relative joins keep
/// the last path segment.
fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    let url = Url::parse(&normalized)
        .map_err(|e| AppError::Config(format!("Invalid B2B_IMPORT_BASE_URL: {}", e)))?;
    if url.cannot_be_a_base() {
        return Err(AppError::Config(
            "B2B_IMPORT_BASE_URL must be an absolute http(s) URL".into(),
        ));
    }
    Ok(url)
}

fn parse_u64(key: &str, value: &str) -> Result<u64, AppError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| AppError::Config(format!("{} must be a non-negative integer", key)))
}

fn parse_positive<F>(lookup: &F, key: &str, default: u64) -> Result<u64, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(optional_positive(lookup, key)?.unwrap_or(default))
}

/// `None` when `key` is unset or blank; zero is rejected.
fn optional_positive<F>(lookup: &F, key: &str) -> Result<Option<u64>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => {
            let parsed = parse_u64(key, &v)?;
            if parsed == 0 {
                return Err(AppError::Config(format!("{} must be greater than 0", key)));
            }
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_base_url_is_set() {
        let config =
            ImportConfig::from_lookup(lookup_from(&[("B2B_IMPORT_BASE_URL", "https://host/api")]))
                .unwrap();

        assert_eq!(config.base_url.as_str(), "https://host/api/");
        assert_eq!(config.poll_interval, Duration::from_millis(5000));
        assert_eq!(config.list_poll_interval, Duration::from_millis(5000));
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert!(config.max_poll_duration.is_none());
        assert!(config.account.is_none());
        assert!(config.auth_token.is_none());
        assert_eq!(config.logging_mode, LoggingMode::PathOnly);
        assert_eq!(config.session_path, PathBuf::from("data/session.json"));
        assert_eq!(config.log_filter, "buyer_org_import=info");
    }

    #[test]
    fn missing_base_url_is_a_config_error() {
        let result = ImportConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let result =
            ImportConfig::from_lookup(lookup_from(&[("B2B_IMPORT_BASE_URL", "buyer-orgs")]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = ImportConfig::from_lookup(lookup_from(&[
            ("B2B_IMPORT_BASE_URL", "https://host/_v/import/"),
            ("B2B_IMPORT_ACCOUNT", "storeaccount"),
            ("B2B_IMPORT_AUTH_TOKEN", "secret-token"),
            ("B2B_IMPORT_POLL_INTERVAL_MS", "250"),
            ("B2B_IMPORT_MAX_POLL_SECS", "600"),
            ("B2B_IMPORT_LOG_QUERY", "true"),
            ("B2B_IMPORT_SESSION_PATH", "/tmp/session.json"),
            ("B2B_IMPORT_LOG", "buyer_org_import=debug"),
        ]))
        .unwrap();

        assert_eq!(config.base_url.as_str(), "https://host/_v/import/");
        assert_eq!(config.account.as_deref(), Some("storeaccount"));
        assert_eq!(
            config.auth_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("secret-token".to_string())
        );
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_poll_duration, Some(Duration::from_secs(600)));
        assert_eq!(config.logging_mode, LoggingMode::PathAndQueryRedacted);
        assert_eq!(config.session_path, PathBuf::from("/tmp/session.json"));
        assert_eq!(config.log_filter, "buyer_org_import=debug");
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let result = ImportConfig::from_lookup(lookup_from(&[
            ("B2B_IMPORT_BASE_URL", "https://host/"),
            ("B2B_IMPORT_POLL_INTERVAL_MS", "0"),
        ]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn zero_max_poll_duration_is_rejected() {
        let result = ImportConfig::from_lookup(lookup_from(&[
            ("B2B_IMPORT_BASE_URL", "https://host/"),
            ("B2B_IMPORT_MAX_POLL_SECS", "0"),
        ]));
        assert!(matches!(result, Err(AppError::Config(_))));

        let blank = ImportConfig::from_lookup(lookup_from(&[
            ("B2B_IMPORT_BASE_URL", "https://host/"),
            ("B2B_IMPORT_MAX_POLL_SECS", " "),
        ]))
        .unwrap();
        assert!(blank.max_poll_duration.is_none());
    }

    #[test]
    fn non_numeric_interval_is_rejected() {
        let result = ImportConfig::from_lookup(lookup_from(&[
            ("B2B_IMPORT_BASE_URL", "https://host/"),
            ("B2B_IMPORT_REQUEST_TIMEOUT_SECS", "soon"),
        ]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = ImportConfig::from_lookup(lookup_from(&[
            ("B2B_IMPORT_BASE_URL", "https://host/"),
            ("B2B_IMPORT_AUTH_TOKEN", "super_secret_token_12345"),
        ]))
        .unwrap();

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super_secret_token_12345"));
    }

    #[test]
    fn with_base_url_uses_defaults() {
        let config = ImportConfig::with_base_url("http://127.0.0.1:9000").unwrap();
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:9000/");
        assert_eq!(config.poll_interval, Duration::from_millis(5000));
    }
}
