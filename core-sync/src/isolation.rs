//! # Adapter Isolation
//!
//! Every call into an adapter runs inside a scoped adapter context:
//!
//! - a task-local [`AdapterContext`] identifying the source being serviced,
//!   installed for the duration of the call and removed when the call
//!   returns, fails, or is dropped mid-flight
//! - an `adapter` tracing span carrying the same identity
//!
//! The caller's own task-local state is never visible to, nor modifiable by,
//! the adapter. Adapters that are not thread-safe additionally get their calls
//! serialized through a per-adapter gate shared by every handle.

use std::future::Future;
use std::sync::Arc;

use bridge_traits::{
    AdapterError, AdapterResult, AdvisoryDetails, AdvisorySyncReport, Capability, ContentProvider,
    ContentSource, ContentSourceId, ContentStream, DistributionDetails, DistributionSyncReport,
    PackageDetails, PackageSyncReport, ProgressWeight, RepoImportReport,
};
use tokio::sync::Mutex;
use tracing::{info_span, Instrument};

use crate::{Result, SyncError};

tokio::task_local! {
    static ADAPTER_CONTEXT: AdapterContext;
}

/// Identity of the adapter a call is executing in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterContext {
    pub source_id: ContentSourceId,
    pub source_name: String,
    pub adapter_type: String,
}

impl AdapterContext {
    pub fn for_source(source: &ContentSource) -> Self {
        Self {
            source_id: source.id,
            source_name: source.name.clone(),
            adapter_type: source.source_type.name.clone(),
        }
    }

    /// Context of the adapter call running on the current task, if any
    pub fn current() -> Option<AdapterContext> {
        ADAPTER_CONTEXT.try_with(|context| context.clone()).ok()
    }
}

/// Run `call` inside the adapter's context and span
pub(crate) async fn in_adapter_context<F>(
    context: &AdapterContext,
    operation: &'static str,
    call: F,
) -> F::Output
where
    F: Future,
{
    let span = info_span!(
        "adapter",
        source_id = %context.source_id,
        source = %context.source_name,
        adapter_type = %context.adapter_type,
        operation
    );
    ADAPTER_CONTEXT
        .scope(context.clone(), call)
        .instrument(span)
        .await
}

/// Capability-checked handle to a running adapter.
///
/// Handles are cheap to clone and must not be kept across synchronization
/// runs; resolve a fresh one from the registry so restarts take effect.
#[derive(Clone)]
pub struct IsolatedAdapter {
    context: AdapterContext,
    provider: Arc<dyn ContentProvider>,
    gate: Option<Arc<Mutex<()>>>,
}

impl IsolatedAdapter {
    pub(crate) fn new(
        context: AdapterContext,
        provider: Arc<dyn ContentProvider>,
        gate: Option<Arc<Mutex<()>>>,
    ) -> Self {
        Self {
            context,
            provider,
            gate,
        }
    }

    pub fn source_id(&self) -> ContentSourceId {
        self.context.source_id
    }

    pub fn context(&self) -> &AdapterContext {
        &self.context
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.provider.capabilities()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::RepoSource => self.provider.as_repo_source().is_some(),
            Capability::PackageSource => self.provider.as_package_source().is_some(),
            Capability::DistributionSource => self.provider.as_distribution_source().is_some(),
            Capability::AdvisorySource => self.provider.as_advisory_source().is_some(),
        }
    }

    pub fn progress_weight(&self) -> ProgressWeight {
        ADAPTER_CONTEXT.sync_scope(self.context.clone(), || self.provider.progress_weight())
    }

    async fn isolate<F>(&self, operation: &'static str, call: F) -> F::Output
    where
        F: Future,
    {
        let _permit = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        in_adapter_context(&self.context, operation, call).await
    }

    fn unsupported(&self, capability: Capability) -> SyncError {
        SyncError::UnsupportedCapability {
            source_id: self.context.source_id,
            capability,
        }
    }

    fn adapter_error(&self, operation: &'static str) -> impl FnOnce(AdapterError) -> SyncError {
        let source_id = self.context.source_id;
        move |e| SyncError::from_adapter(source_id, operation, e)
    }

    pub async fn test_connection(&self) -> AdapterResult<()> {
        self.isolate("test_connection", self.provider.test_connection())
            .await
    }

    pub async fn import_repos(&self) -> Result<RepoImportReport> {
        let repos = self
            .provider
            .as_repo_source()
            .ok_or_else(|| self.unsupported(Capability::RepoSource))?;
        self.isolate("import_repos", repos.import_repos())
            .await
            .map_err(self.adapter_error("import repositories"))
    }

    pub async fn synchronize_packages(
        &self,
        repo_name: &str,
        report: &mut PackageSyncReport,
        existing: &[PackageDetails],
    ) -> Result<()> {
        let packages = self
            .provider
            .as_package_source()
            .ok_or_else(|| self.unsupported(Capability::PackageSource))?;
        self.isolate(
            "synchronize_packages",
            packages.synchronize_packages(repo_name, report, existing),
        )
        .await
        .map_err(self.adapter_error("synchronize packages"))
    }

    pub async fn open_package_bits(&self, location: &str) -> Result<Option<ContentStream>> {
        let packages = self
            .provider
            .as_package_source()
            .ok_or_else(|| self.unsupported(Capability::PackageSource))?;
        self.isolate("open_package_bits", packages.open_package_bits(location))
            .await
            .map_err(self.adapter_error("open package bits"))
    }

    pub async fn synchronize_distributions(
        &self,
        repo_name: &str,
        report: &mut DistributionSyncReport,
        existing: &[DistributionDetails],
    ) -> Result<()> {
        let distributions = self
            .provider
            .as_distribution_source()
            .ok_or_else(|| self.unsupported(Capability::DistributionSource))?;
        self.isolate(
            "synchronize_distributions",
            distributions.synchronize_distributions(repo_name, report, existing),
        )
        .await
        .map_err(self.adapter_error("synchronize distributions"))
    }

    pub async fn open_distribution_bits(&self, location: &str) -> Result<Option<ContentStream>> {
        let distributions = self
            .provider
            .as_distribution_source()
            .ok_or_else(|| self.unsupported(Capability::DistributionSource))?;
        self.isolate(
            "open_distribution_bits",
            distributions.open_distribution_bits(location),
        )
        .await
        .map_err(self.adapter_error("open distribution bits"))
    }

    pub async fn synchronize_advisories(
        &self,
        repo_name: &str,
        report: &mut AdvisorySyncReport,
        existing: &[AdvisoryDetails],
    ) -> Result<()> {
        let advisories = self
            .provider
            .as_advisory_source()
            .ok_or_else(|| self.unsupported(Capability::AdvisorySource))?;
        self.isolate(
            "synchronize_advisories",
            advisories.synchronize_advisories(repo_name, report, existing),
        )
        .await
        .map_err(self.adapter_error("synchronize advisories"))
    }
}

impl std::fmt::Debug for IsolatedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedAdapter")
            .field("context", &self.context)
            .field("serialized", &self.gate.is_some())
            .finish()
    }
}
