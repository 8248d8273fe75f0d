//! Record Store Abstraction
//!
//! The narrow read/write interface the synchronization engine uses to reach
//! the system of record. Content sources, repositories and sync results are
//! owned by the store; the engine only holds run-scoped copies.

use async_trait::async_trait;
use bytes::Bytes;

use crate::content::{
    AdvisoryDetails, AdvisorySyncReport, DistributionDetails, DistributionFileRef,
    DistributionSyncReport, PackageDetails, PackageKey, PackageSyncReport, RepoImportReport,
};
use crate::error::Result;
use crate::model::{ContentSource, ContentSourceId, Repo, RepoId};
use crate::sync_result::{SyncResult, SyncResultId, SyncTarget};

/// Persistent storage for sync bookkeeping and synchronized content.
///
/// # Merge rules
///
/// `merge_sync_result` must:
/// - bump `version` and return the stored copy;
/// - refuse (`BridgeError::Conflict`) to change the status of a result that is
///   already terminal;
/// - keep a pending `CANCELLING` status when the incoming status is
///   non-terminal, so a cancellation request survives concurrent progress
///   writes until the running engine observes it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ------------------------------------------------------------------
    // Sources & repositories
    // ------------------------------------------------------------------

    async fn load_source(&self, id: ContentSourceId) -> Result<Option<ContentSource>>;

    /// All configured content sources
    async fn load_sources(&self) -> Result<Vec<ContentSource>>;

    async fn load_repo(&self, id: RepoId) -> Result<Option<Repo>>;

    // ------------------------------------------------------------------
    // Sync results
    // ------------------------------------------------------------------

    /// Persist a new sync result.
    ///
    /// Returns `None` without writing anything when a non-terminal result
    /// already exists for the same target. The check and the insert must be
    /// atomic within one process; nothing is promised across processes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn create_sync_result(&self, result: SyncResult) -> Result<Option<SyncResult>>;

    /// Write back a sync result, returning the canonical stored copy
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown result and `Conflict` when the merge
    /// would alter a terminal status.
    async fn merge_sync_result(&self, result: SyncResult) -> Result<SyncResult>;

    /// Most recently started result for `target`
    async fn load_latest_sync_result(&self, target: SyncTarget) -> Result<Option<SyncResult>>;

    async fn load_sync_result(&self, id: SyncResultId) -> Result<Option<SyncResult>>;

    /// Flag the running sync of `repo` as `CANCELLING`.
    ///
    /// Returns `false` when there is no non-terminal result to cancel.
    async fn request_cancel(&self, repo: RepoId) -> Result<bool>;

    // ------------------------------------------------------------------
    // Synchronized content
    // ------------------------------------------------------------------

    /// Record repositories discovered on a source, returning how many were new
    async fn import_candidate_repos(
        &self,
        source: ContentSourceId,
        report: &RepoImportReport,
    ) -> Result<usize>;

    async fn list_packages(&self, repo: RepoId, source: ContentSourceId)
        -> Result<Vec<PackageDetails>>;

    async fn merge_package_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &PackageSyncReport,
    ) -> Result<()>;

    async fn packages_missing_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<PackageDetails>>;

    async fn save_package_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        key: &PackageKey,
        bits: Bytes,
    ) -> Result<()>;

    async fn list_distributions(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<DistributionDetails>>;

    async fn merge_distribution_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &DistributionSyncReport,
    ) -> Result<()>;

    async fn distribution_files_missing_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<DistributionFileRef>>;

    async fn save_distribution_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        file: &DistributionFileRef,
        bits: Bytes,
    ) -> Result<()>;

    async fn list_advisories(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<AdvisoryDetails>>;

    async fn merge_advisory_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &AdvisorySyncReport,
    ) -> Result<()>;
}
