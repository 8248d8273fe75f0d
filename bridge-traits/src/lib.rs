//! # Content Sync Bridge Traits
//!
//! Contracts between the synchronization engine and the collaborators it
//! does not own.
//!
//! ## Overview
//!
//! The engine talks to two kinds of external parties:
//!
//! - **Adapters** that know how to reach one kind of content source
//!   ([`ContentProvider`](provider::ContentProvider) plus optional capability
//!   traits)
//! - **The record store** that durably owns sources, repositories, sync
//!   results and synchronized content ([`RecordStore`](record_store::RecordStore))
//!
//! This crate defines both contracts together with the records that cross
//! them.
//!
//! ## Traits
//!
//! ### Adapters
//! - [`ContentProvider`](provider::ContentProvider) - lifecycle, connection test, progress weights
//! - [`RepoSource`](provider::RepoSource) - candidate repository discovery
//! - [`PackageSource`](provider::PackageSource) - package metadata and bits
//! - [`DistributionSource`](provider::DistributionSource) - distribution trees and bits
//! - [`AdvisorySource`](provider::AdvisorySource) - advisory metadata
//!
//! ### Persistence
//! - [`RecordStore`](record_store::RecordStore) - sync bookkeeping and content metadata
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! Record store implementations report failures as
//! [`BridgeError`](error::BridgeError). Adapters report failures as
//! [`AdapterError`](provider::AdapterError); only its `Transport` variant is
//! retried by the engine.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`. Adapters that cannot tolerate concurrent
//! calls say so through `ContentProvider::is_thread_safe` and the engine
//! serializes access to them.

pub mod content;
pub mod error;
pub mod model;
pub mod provider;
pub mod record_store;
pub mod sync_result;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use content::{
    AdvisoryDetails, AdvisorySyncReport, DistributionDetails, DistributionFileDetails,
    DistributionFileRef, DistributionSyncReport, PackageDetails, PackageKey, PackageSyncReport,
    RepoDetails, RepoImportReport,
};
pub use model::{Configuration, ContentSource, ContentSourceId, ContentSourceType, Repo, RepoId};
pub use provider::{
    AdapterError, AdapterResult, AdvisorySource, Capability, ContentProvider, ContentStream,
    DistributionSource, PackageSource, ProgressWeight, RepoSource,
};
pub use record_store::RecordStore;
pub use sync_result::{SyncResult, SyncResultId, SyncStatus, SyncTarget};
pub use time::{Clock, FixedClock, SystemClock};
