//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the content synchronization engine:
//! - Logging and tracing infrastructure
//! - Engine configuration
//! - Event bus for sync lifecycle notifications
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the engine and adapters depend on.
//! It establishes the logging conventions and event broadcasting mechanism used
//! throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, SyncEvent};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
