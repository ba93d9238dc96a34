//! Container boot configuration.
//!
//! # Example
//!
//! ```ignore
//! use remote_container::ContainerConfig;
//!
//! let config: ContainerConfig = serde_json::from_str(
//!     r#"{ "url": "ws://127.0.0.1:9000", "workdirName": "todo-app" }"#,
//! )?;
//! let container = Container::boot(config).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::ConnectionSettings;
use crate::transport::connection::{DEFAULT_MAX_PENDING_REQUESTS, DEFAULT_REQUEST_TIMEOUT};

// ============================================================================
// Constants
// ============================================================================

/// Working directory name used when none is given.
pub const DEFAULT_WORKDIR_NAME: &str = "project";

/// Default deadline for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// ContainerConfig
// ============================================================================

/// Everything needed to boot a container.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerConfig {
    /// Sandbox endpoint (`ws://` or `wss://`).
    pub url: String,

    /// Working directory to create or reuse on the sandbox.
    pub workdir_name: String,

    /// Deadline for each correlated request, in milliseconds.
    pub request_timeout_ms: u64,

    /// Deadline for the WebSocket handshake, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Back-pressure limit on in-flight requests.
    pub max_pending_requests: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            workdir_name: DEFAULT_WORKDIR_NAME.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
        }
    }
}

impl ContainerConfig {
    /// Creates a config for `url` with defaults elsewhere.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Request deadline.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Handshake deadline.
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-connection limits.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            request_timeout: self.request_timeout(),
            max_pending_requests: self.max_pending_requests,
        }
    }

    /// Checks the config and returns the parsed endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is missing, malformed, or not
    /// `ws`/`wss`, if the workdir name is empty or contains `/`, or if a
    /// limit is zero.
    pub fn validate(&self) -> Result<Url> {
        if self.url.is_empty() {
            return Err(Error::config(
                "Sandbox URL is required. Use .url() to set it.\n\
                 Example: Container::builder().url(\"ws://127.0.0.1:9000\")",
            ));
        }

        let url = Url::parse(&self.url)
            .map_err(|e| Error::config(format!("Invalid sandbox URL '{}': {e}", self.url)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Sandbox URL must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }

        if self.workdir_name.trim().is_empty() {
            return Err(Error::config("Workdir name must not be empty"));
        }
        if self.workdir_name.contains('/') {
            return Err(Error::config(format!(
                "Workdir name must be a single path segment, got '{}'",
                self.workdir_name
            )));
        }

        if self.request_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(Error::config("Timeouts must be greater than zero"));
        }
        if self.max_pending_requests == 0 {
            return Err(Error::config("max_pending_requests must be greater than zero"));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::default();
        assert_eq!(config.workdir_name, DEFAULT_WORKDIR_NAME);
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.max_pending_requests, DEFAULT_MAX_PENDING_REQUESTS);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: ContainerConfig = serde_json::from_value(serde_json::json!({
            "url": "ws://127.0.0.1:9000",
            "workdirName": "todo-app",
            "requestTimeoutMs": 500,
        }))
        .expect("parse config");

        assert_eq!(config.workdir_name, "todo-app");
        assert_eq!(config.request_timeout(), Duration::from_millis(500));
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_validate_accepts_ws_and_wss() {
        assert!(ContainerConfig::new("ws://localhost:9000").validate().is_ok());
        assert!(ContainerConfig::new("wss://sandbox.example.com/session").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        for url in ["", "not a url", "http://localhost:9000"] {
            let err = ContainerConfig::new(url).validate().expect_err("invalid url");
            assert!(matches!(err, Error::Config { .. }), "{url}: {err}");
        }
    }

    #[test]
    fn test_validate_rejects_bad_workdir() {
        let mut config = ContainerConfig::new("ws://localhost:9000");
        config.workdir_name = "  ".into();
        assert!(config.validate().is_err());

        config.workdir_name = "a/b".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = ContainerConfig::new("ws://localhost:9000");
        config.max_pending_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_settings() {
        let mut config = ContainerConfig::new("ws://localhost:9000");
        config.request_timeout_ms = 250;
        config.max_pending_requests = 8;

        let settings = config.connection_settings();
        assert_eq!(settings.request_timeout, Duration::from_millis(250));
        assert_eq!(settings.max_pending_requests, 8);
    }
}
