//! # Engine Configuration Module
//!
//! Provides configuration management for the content synchronization engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! `EngineConfig`. Validation is fail-fast: `build()` rejects values the
//! engine cannot run with instead of deferring the failure to the first sync.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::EngineConfig;
//! use std::time::Duration;
//!
//! let config = EngineConfig::builder()
//!     .database_url("sqlite:///var/lib/content-sync/records.db")
//!     .stream_retry_attempts(3)
//!     .stream_retry_delay(Duration::from_millis(250))
//!     .build()
//!     .expect("Failed to build config");
//! ```

use std::time::Duration;

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;

/// Default record store location
pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

/// Additional attempts after the first when streaming content bits
pub const DEFAULT_STREAM_RETRY_ATTEMPTS: u32 = 3;

const MAX_STREAM_RETRY_ATTEMPTS: u32 = 20;

/// Runtime settings of the synchronization engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Record store connection string
    pub database_url: String,
    /// Connection pool size of the record store
    pub max_connections: u32,
    /// Retries after the first failed attempt to open a content stream
    pub stream_retry_attempts: u32,
    /// Pause between streaming attempts
    pub stream_retry_delay: Duration,
    /// Capacity of the sync event broadcast channel
    pub event_buffer_size: usize,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
            stream_retry_attempts: DEFAULT_STREAM_RETRY_ATTEMPTS,
            stream_retry_delay: Duration::ZERO,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new builder for constructing an `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Total number of attempts made when streaming content bits
    pub fn stream_attempts(&self) -> u32 {
        self.stream_retry_attempts + 1
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database URL is not empty
    /// - Pool size and event buffer are non-zero
    /// - Retry bound stays within a sane ceiling
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::Config("Database URL cannot be empty".to_string()));
        }

        if self.max_connections == 0 {
            return Err(Error::Config(
                "Connection pool must allow at least one connection".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.stream_retry_attempts > MAX_STREAM_RETRY_ATTEMPTS {
            return Err(Error::Config(format!(
                "Stream retry attempts exceeds maximum of {}",
                MAX_STREAM_RETRY_ATTEMPTS
            )));
        }

        Ok(())
    }
}

/// Builder for constructing [`EngineConfig`] instances.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    database_url: Option<String>,
    max_connections: Option<u32>,
    stream_retry_attempts: Option<u32>,
    stream_retry_delay: Option<Duration>,
    event_buffer_size: Option<usize>,
    logging: Option<LoggingConfig>,
}

impl EngineConfigBuilder {
    /// Sets the record store connection string, e.g. `sqlite://records.db`.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets how many times a failed stream request is retried.
    pub fn stream_retry_attempts(mut self, attempts: u32) -> Self {
        self.stream_retry_attempts = Some(attempts);
        self
    }

    pub fn stream_retry_delay(mut self, delay: Duration) -> Self {
        self.stream_retry_delay = Some(delay);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any setting fails validation.
    pub fn build(self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            database_url: self.database_url.unwrap_or(defaults.database_url),
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            stream_retry_attempts: self
                .stream_retry_attempts
                .unwrap_or(defaults.stream_retry_attempts),
            stream_retry_delay: self.stream_retry_delay.unwrap_or(defaults.stream_retry_delay),
            event_buffer_size: self.event_buffer_size.unwrap_or(defaults.event_buffer_size),
            logging: self.logging.unwrap_or(defaults.logging),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;

    #[test]
    fn test_defaults_allow_four_stream_attempts() {
        let config = EngineConfig::builder().build().unwrap();

        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.stream_retry_attempts, 3);
        assert_eq!(config.stream_attempts(), 4);
        assert_eq!(config.stream_retry_delay, Duration::ZERO);
    }

    #[test]
    fn test_builder_overrides() {
        let config = EngineConfig::builder()
            .database_url("sqlite://records.db")
            .max_connections(2)
            .stream_retry_attempts(1)
            .stream_retry_delay(Duration::from_millis(10))
            .event_buffer_size(8)
            .logging(LoggingConfig::default().with_level(LogLevel::Debug))
            .build()
            .unwrap();

        assert_eq!(config.database_url, "sqlite://records.db");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.stream_attempts(), 2);
        assert_eq!(config.event_buffer_size, 8);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_empty_database_url_rejected() {
        let result = EngineConfig::builder().database_url("  ").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(EngineConfig::builder().max_connections(0).build().is_err());
        assert!(EngineConfig::builder().event_buffer_size(0).build().is_err());
    }

    #[test]
    fn test_retry_ceiling() {
        let result = EngineConfig::builder().stream_retry_attempts(50).build();
        assert!(result.is_err());
    }
}
