//! # Disk Content Provider
//!
//! Reference adapter serving content from a local directory tree.
//!
//! ## Overview
//!
//! This crate provides:
//! - Candidate repository discovery: every directory under the root
//! - Package synchronization of the files inside a repository's directory,
//!   filtered by a filename regex
//! - Streaming of package bits straight from disk
//!
//! ## Configuration
//!
//! | Key                    | Default  |
//! |------------------------|----------|
//! | `rootDirectory`        | required |
//! | `packageSourceEnabled` | `true`   |
//! | `repoSourceEnabled`    | `true`   |
//! | `filenameFilter`       | `.*`     |
//! | `packageTypeName`      | `file`   |
//! | `architectureName`     | `noarch` |

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{DiskContentProvider, DISK_SOURCE_TYPE};
pub use error::{DiskError, Result};
pub use types::DiskConfig;
