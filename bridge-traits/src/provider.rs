//! # Content Provider Contract
//!
//! The contract every adapter implements. An adapter services exactly one
//! content source and exposes the optional capabilities it supports through
//! the `as_*` accessors; the engine never probes types at runtime.
//!
//! ## Capabilities
//!
//! - [`RepoSource`] - discovers candidate repositories on the source
//! - [`PackageSource`] - package metadata and package bits
//! - [`DistributionSource`] - distribution trees and their files
//! - [`AdvisorySource`] - errata/advisory metadata

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::content::{
    AdvisoryDetails, AdvisorySyncReport, DistributionDetails, DistributionSyncReport,
    PackageDetails, PackageSyncReport, RepoImportReport,
};
use crate::model::Configuration;

/// Byte stream handed out for package or distribution bits
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

/// Errors raised by adapter implementations
#[derive(Error, Debug)]
pub enum AdapterError {
    /// I/O failure talking to the remote side; the only retryable kind
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Remote repository error: {0}")]
    Remote(String),

    #[error("{0}")]
    Other(String),
}

impl AdapterError {
    pub fn is_transport(&self) -> bool {
        matches!(self, AdapterError::Transport(_))
    }
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Relative cost of one item in each phase.
///
/// Only used to compute a proportionally accurate percent-complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressWeight {
    pub package_metadata: u32,
    pub package_bits: u32,
    pub distribution_metadata: u32,
    pub distribution_bits: u32,
    pub advisory_metadata: u32,
}

impl ProgressWeight {
    pub fn new(
        package_metadata: u32,
        package_bits: u32,
        distribution_metadata: u32,
        distribution_bits: u32,
        advisory_metadata: u32,
    ) -> Self {
        Self {
            package_metadata,
            package_bits,
            distribution_metadata,
            distribution_bits,
            advisory_metadata,
        }
    }
}

impl Default for ProgressWeight {
    fn default() -> Self {
        Self::new(1, 5, 1, 5, 1)
    }
}

/// Optional adapter capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    RepoSource,
    PackageSource,
    DistributionSource,
    AdvisorySource,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::RepoSource => "repo-source",
            Capability::PackageSource => "package-source",
            Capability::DistributionSource => "distribution-source",
            Capability::AdvisorySource => "advisory-source",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle contract of an adapter instance.
///
/// `initialize` runs exactly once, before the instance is shared. Everything
/// else may be called concurrently unless `is_thread_safe` returns `false`, in
/// which case the engine serializes calls.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Apply the source's connection configuration and prepare for use
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the remote side
    /// cannot be reached.
    async fn initialize(&mut self, configuration: &Configuration) -> AdapterResult<()>;

    /// Release resources held by the adapter
    async fn shutdown(&self) -> AdapterResult<()>;

    /// Verify the remote side is reachable with the current configuration
    async fn test_connection(&self) -> AdapterResult<()>;

    fn progress_weight(&self) -> ProgressWeight {
        ProgressWeight::default()
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn as_repo_source(&self) -> Option<&dyn RepoSource> {
        None
    }

    fn as_package_source(&self) -> Option<&dyn PackageSource> {
        None
    }

    fn as_distribution_source(&self) -> Option<&dyn DistributionSource> {
        None
    }

    fn as_advisory_source(&self) -> Option<&dyn AdvisorySource> {
        None
    }

    /// Capabilities derived from the `as_*` accessors
    fn capabilities(&self) -> Vec<Capability> {
        let mut capabilities = Vec::new();
        if self.as_repo_source().is_some() {
            capabilities.push(Capability::RepoSource);
        }
        if self.as_package_source().is_some() {
            capabilities.push(Capability::PackageSource);
        }
        if self.as_distribution_source().is_some() {
            capabilities.push(Capability::DistributionSource);
        }
        if self.as_advisory_source().is_some() {
            capabilities.push(Capability::AdvisorySource);
        }
        capabilities
    }
}

/// Discovers repositories hosted by the content source
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn import_repos(&self) -> AdapterResult<RepoImportReport>;
}

#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Diff the remote packages of `repo_name` against `existing`
    async fn synchronize_packages(
        &self,
        repo_name: &str,
        report: &mut PackageSyncReport,
        existing: &[PackageDetails],
    ) -> AdapterResult<()>;

    /// Open the bits stored at `location`.
    ///
    /// `Ok(None)` breaks the contract; the engine reports it as a protocol
    /// violation.
    async fn open_package_bits(&self, location: &str) -> AdapterResult<Option<ContentStream>>;
}

#[async_trait]
pub trait DistributionSource: Send + Sync {
    async fn synchronize_distributions(
        &self,
        repo_name: &str,
        report: &mut DistributionSyncReport,
        existing: &[DistributionDetails],
    ) -> AdapterResult<()>;

    async fn open_distribution_bits(&self, location: &str)
        -> AdapterResult<Option<ContentStream>>;
}

#[async_trait]
pub trait AdvisorySource: Send + Sync {
    async fn synchronize_advisories(
        &self,
        repo_name: &str,
        report: &mut AdvisorySyncReport,
        existing: &[AdvisoryDetails],
    ) -> AdapterResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MetadataOnly;

    #[async_trait]
    impl ContentProvider for MetadataOnly {
        async fn initialize(&mut self, _configuration: &Configuration) -> AdapterResult<()> {
            Ok(())
        }

        async fn shutdown(&self) -> AdapterResult<()> {
            Ok(())
        }

        async fn test_connection(&self) -> AdapterResult<()> {
            Ok(())
        }

        fn as_advisory_source(&self) -> Option<&dyn AdvisorySource> {
            Some(self)
        }
    }

    #[async_trait]
    impl AdvisorySource for MetadataOnly {
        async fn synchronize_advisories(
            &self,
            _repo_name: &str,
            report: &mut AdvisorySyncReport,
            _existing: &[AdvisoryDetails],
        ) -> AdapterResult<()> {
            report.add_new_advisory(AdvisoryDetails::new("RHSA-1", "security", "fix"));
            Ok(())
        }
    }

    #[test]
    fn test_capabilities_follow_accessors() {
        let provider = MetadataOnly;
        assert_eq!(provider.capabilities(), vec![Capability::AdvisorySource]);
        assert!(provider.as_package_source().is_none());
        assert!(provider.is_thread_safe());
        assert_eq!(provider.progress_weight(), ProgressWeight::default());
    }

    #[tokio::test]
    async fn test_capability_dispatch() {
        let provider = MetadataOnly;
        let advisories = provider.as_advisory_source().unwrap();
        let mut report = AdvisorySyncReport::default();
        advisories
            .synchronize_advisories("repo", &mut report, &[])
            .await
            .unwrap();
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_only_io_errors_are_transport() {
        let io = AdapterError::from(std::io::Error::new(std::io::ErrorKind::Other, "reset"));
        assert!(io.is_transport());
        assert!(!AdapterError::Remote("404".into()).is_transport());
    }
}
