//! Workspace umbrella crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (`core-sync`, `provider-disk`). Hosts can depend on
//! `content-sync-workspace` and enable the documented features without wiring
//! each crate individually.

#[cfg(feature = "engine")]
pub use core_sync as engine;

#[cfg(feature = "disk-provider")]
pub use provider_disk as disk;
