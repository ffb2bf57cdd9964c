//! Connector settings
//!
//! Built once at startup from environment variables and passed by reference
//! to every component. Nothing reads the process environment after this.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub const DEFAULT_QUERIES_FILE: &str = "queries.json";
pub const DEFAULT_RETRY_COUNT: u32 = 2;
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_RESULT_SIZE: u32 = 500;
pub const DEFAULT_WEBAMON_INDEX: &str = "scans";

const REQUIRED_VARS: [&str; 4] = ["MISP_URL", "MISP_KEY", "WEBAMON_URL", "WEBAMON_KEY"];

/// MISP connection settings
#[derive(Clone)]
pub struct MispSettings {
    pub url: String,
    pub key: String,
    /// Verify the server's TLS certificate
    pub verify_cert: bool,
}

/// Webamon search API settings
#[derive(Clone)]
pub struct WebamonSettings {
    pub url: String,
    pub key: String,
    /// Value of the `size` request parameter
    pub result_size: u32,
    /// Value of the `index` request parameter
    pub index: String,
}

/// Immutable run configuration.
#[derive(Clone)]
pub struct Settings {
    pub misp: MispSettings,
    pub webamon: WebamonSettings,
    pub queries_file: PathBuf,
    /// Retries after the first attempt
    pub retry_count: u32,
    pub retry_delay: Duration,
    /// Upper bound for one HTTP attempt
    pub request_timeout: Duration,
    pub debug: bool,
    pub verbose: bool,
    pub log_dir: PathBuf,
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// All missing required variables are reported in one error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_VARS
            .into_iter()
            .filter(|&name| get(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }
        let required = |name: &str| get(name).unwrap_or_default();

        Ok(Settings {
            misp: MispSettings {
                url: required("MISP_URL"),
                key: required("MISP_KEY"),
                verify_cert: get("VERIFY_CERT").map(|v| parse_flag(&v)).unwrap_or(false),
            },
            webamon: WebamonSettings {
                url: required("WEBAMON_URL"),
                key: required("WEBAMON_KEY"),
                result_size: parse_number("WEBAMON_RESULT_SIZE", get("WEBAMON_RESULT_SIZE"))?
                    .unwrap_or(DEFAULT_RESULT_SIZE),
                index: get("WEBAMON_INDEX").unwrap_or_else(|| DEFAULT_WEBAMON_INDEX.to_string()),
            },
            queries_file: get("QUERIES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_QUERIES_FILE)),
            retry_count: parse_number("RETRY_COUNT", get("RETRY_COUNT"))?
                .unwrap_or(DEFAULT_RETRY_COUNT),
            retry_delay: parse_seconds("RETRY_DELAY", get("RETRY_DELAY"))?
                .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS)),
            request_timeout: parse_seconds("REQUEST_TIMEOUT", get("REQUEST_TIMEOUT"))?
                .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS)),
            debug: get("DEBUG_MODE").map(|v| parse_flag(&v)).unwrap_or(false),
            verbose: get("VERBOSE").map(|v| parse_flag(&v)).unwrap_or(false),
            log_dir: get("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        })
    }

    /// Retry policy shared by every external call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count.saturating_add(1), self.retry_delay)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("misp_url", &self.misp.url)
            .field("misp_key", &"<redacted>")
            .field("verify_cert", &self.misp.verify_cert)
            .field("webamon_url", &self.webamon.url)
            .field("webamon_key", &"<redacted>")
            .field("result_size", &self.webamon.result_size)
            .field("index", &self.webamon.index)
            .field("queries_file", &self.queries_file)
            .field("retry_count", &self.retry_count)
            .field("retry_delay", &self.retry_delay)
            .field("request_timeout", &self.request_timeout)
            .field("debug", &self.debug)
            .field("verbose", &self.verbose)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

/// `true`, `1` and `yes` (any case) enable a flag; anything else disables it.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

fn parse_number(var: &str, value: Option<String>) -> Result<Option<u32>, ConfigError> {
    value
        .map(|v| {
            v.trim().parse::<u32>().map_err(|e| ConfigError::InvalidValue {
                var: var.to_string(),
                value: v.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_seconds(var: &str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let invalid = |reason: String| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw.clone(),
        reason,
    };
    let secs: f64 = raw.trim().parse().map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid("expected a non-negative number of seconds".to_string()));
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|e| invalid(e.to_string()))
}
