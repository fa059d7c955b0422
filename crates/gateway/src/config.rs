//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::RetryPolicy;

/// Gateway configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `5000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `"json"` for JSON lines, anything else for plain text
/// - `DATABASE_URL`: PostgreSQL durable store; in-memory when unset
/// - `TRANSPORT_MAX_ATTEMPTS`: delivery attempts per remote call (default: `3`)
/// - `TRANSPORT_BACKOFF_MS`: first retry delay in milliseconds (default: `50`)
/// - `WORKER_REPLICAS`: nodes per service group (default: `2`)
/// - `CORS_ORIGIN`: allowed browser origin (default: `"http://localhost:5173"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub json_logs: bool,
    pub database_url: Option<String>,
    pub transport_max_attempts: u32,
    pub transport_backoff_ms: u64,
    pub worker_replicas: usize,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.parse().ok())
        }

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            json_logs: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            transport_max_attempts: parsed(&lookup, "TRANSPORT_MAX_ATTEMPTS")
                .unwrap_or(defaults.transport_max_attempts),
            transport_backoff_ms: parsed(&lookup, "TRANSPORT_BACKOFF_MS")
                .unwrap_or(defaults.transport_backoff_ms),
            worker_replicas: parsed(&lookup, "WORKER_REPLICAS").unwrap_or(defaults.worker_replicas),
            cors_origin: lookup("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Retry policy for the worker transport.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.transport_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.transport_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            log_level: "info".to_string(),
            json_logs: false,
            database_url: None,
            transport_max_attempts: policy.max_attempts,
            transport_backoff_ms: policy.initial_backoff.as_millis() as u64,
            worker_replicas: 2,
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}
