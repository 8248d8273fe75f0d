//! # Content Synchronization Engine
//!
//! Pulls package, distribution and advisory metadata and bits from content
//! sources into the record store through pluggable adapters.
//!
//! ## Overview
//!
//! - Adapters are owned by the [`AdapterRegistry`] and only reachable through
//!   [`IsolatedAdapter`] handles that scope every call to the adapter
//! - Source syncs discover candidate repositories and are single-flight
//!   guarded per process
//! - Repo syncs run every phase against every attached source, phase-major,
//!   isolating failures per (phase, source) pair and honoring cooperative
//!   cancellation
//! - Progress is accounted in weighted units by the [`SyncTracker`]
//!
//! ## Components
//!
//! - **Manager** (`manager`): the entry point, [`ContentProviderManager`]
//! - **Registry** (`registry`): adapter factories and lifecycle
//! - **Isolation** (`isolation`): scoped adapter context and capability checks
//! - **Pipeline** (`pipeline`): phase ordering, cancellation, fault isolation
//! - **Synchronizers** (`synchronizer`): per-phase bodies
//! - **Tracker** (`tracker`): weighted progress and result persistence
//! - **Retry** (`retry`, `streaming`): bounded retry of content streaming
//! - **Stores** (`store`): in-memory and SQLite record stores

pub mod error;
pub mod isolation;
pub mod manager;
pub mod phase;
mod pipeline;
pub mod registry;
pub mod retry;
pub mod store;
pub mod streaming;
mod synchronizer;
pub mod tracker;

pub use error::{format_error_chain, Result, SyncError};
pub use isolation::{AdapterContext, IsolatedAdapter};
pub use manager::{ContentProviderManager, ContentProviderManagerBuilder};
pub use phase::{SyncPhase, PHASE_GROUPS};
pub use registry::{AdapterFactory, AdapterRegistry, FnAdapterFactory};
pub use retry::RetryPolicy;
pub use store::{InMemoryRecordStore, SqliteRecordStore};
pub use streaming::{open_with_retry, BitsKind};
pub use tracker::SyncTracker;
