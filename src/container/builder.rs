//! Builder pattern for container configuration.
//!
//! Provides a fluent API for configuring and booting a [`Container`].
//!
//! # Example
//!
//! ```no_run
//! use remote_container::Container;
//!
//! # async fn example() -> remote_container::Result<()> {
//! let container = Container::builder()
//!     .url("ws://127.0.0.1:9000")
//!     .workdir_name("todo-app")
//!     .boot()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;

use super::config::ContainerConfig;
use super::core::Container;

// ============================================================================
// ContainerBuilder
// ============================================================================

/// Builder for configuring a [`Container`].
///
/// Use [`Container::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ContainerBuilder {
    config: ContainerConfig,
}

// ============================================================================
// ContainerBuilder Implementation
// ============================================================================

impl ContainerBuilder {
    /// Creates a builder with default settings and no URL.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing config.
    #[inline]
    #[must_use]
    pub fn from_config(config: ContainerConfig) -> Self {
        Self { config }
    }

    /// Sets the sandbox endpoint.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` URL of the sandbox
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Sets the working directory name.
    #[inline]
    #[must_use]
    pub fn workdir_name(mut self, name: impl Into<String>) -> Self {
        self.config.workdir_name = name.into();
        self
    }

    /// Sets the deadline for each correlated request.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the deadline for the WebSocket handshake.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the back-pressure limit on in-flight requests.
    #[inline]
    #[must_use]
    pub fn max_pending_requests(mut self, limit: usize) -> Self {
        self.config.max_pending_requests = limit;
        self
    }

    /// Validates and returns the config without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if validation fails.
    pub fn build(self) -> Result<ContainerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validates, connects, and boots.
    ///
    /// # Errors
    ///
    /// See [`Container::boot`].
    pub async fn boot(self) -> Result<Container> {
        Container::boot(self.build()?).await
    }
}

// ============================================================================
// Tests
// ============================================================================
