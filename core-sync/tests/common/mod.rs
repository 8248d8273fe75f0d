//! Scripted adapter and engine harness shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    AdapterError, AdapterResult, AdvisoryDetails, AdvisorySource, AdvisorySyncReport,
    BridgeError, Capability, Configuration, ContentProvider, ContentSource, ContentSourceId,
    ContentSourceType, ContentStream, DistributionDetails, DistributionFileDetails,
    DistributionFileRef, DistributionSource, DistributionSyncReport, FixedClock, PackageDetails,
    PackageKey, PackageSource, PackageSyncReport, ProgressWeight, RecordStore, Repo, RepoDetails,
    RepoId, RepoImportReport, RepoSource, SyncResult, SyncResultId, SyncTarget,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_runtime::config::EngineConfig;
use core_sync::{ContentProviderManager, FnAdapterFactory, InMemoryRecordStore};

pub const REPO: RepoId = RepoId(1);

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

// ============================================================================
// Call journal
// ============================================================================

/// Ordered record of adapter calls, as `operation(source)`
#[derive(Default)]
pub struct Journal {
    calls: Mutex<Vec<String>>,
}

impl Journal {
    fn record(&self, operation: &str, source: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}({})", operation, source));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose operation is one of `operations`
    pub fn calls_to(&self, operations: &[&str]) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| operations.iter().any(|op| call.starts_with(&format!("{}(", op))))
            .collect()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

// ============================================================================
// Scripted adapter
// ============================================================================

/// Behaviour of the adapter serving one source
#[derive(Clone, Default)]
pub struct Script {
    pub packages: usize,
    pub distributions: usize,
    pub advisories: usize,
    pub repos: Vec<&'static str>,
    /// Operations that fail with a non-retryable remote error
    pub fail_on: Vec<&'static str>,
    /// Transport failures raised by the first bit stream requests
    pub transport_failures: usize,
    /// Hand back `Ok(None)` for package bits
    pub null_stream: bool,
    pub without: Vec<Capability>,
    pub weight: Option<ProgressWeight>,
    pub import_delay: Option<Duration>,
    /// Request cancellation of the repo right after package metadata
    pub cancel_after_package_metadata: Option<Arc<InMemoryRecordStore>>,
}

pub struct ScriptedProvider {
    name: String,
    script: Script,
    scripts: Arc<HashMap<String, Script>>,
    journal: Arc<Journal>,
    opens: AtomicUsize,
}

impl ScriptedProvider {
    fn new(scripts: Arc<HashMap<String, Script>>, journal: Arc<Journal>) -> Self {
        Self {
            name: String::new(),
            script: Script::default(),
            scripts,
            journal,
            opens: AtomicUsize::new(0),
        }
    }

    fn call(&self, operation: &'static str) -> AdapterResult<()> {
        self.journal.record(operation, &self.name);
        if self.script.fail_on.contains(&operation) {
            return Err(AdapterError::Remote(format!(
                "{} refused by {}",
                operation, self.name
            )));
        }
        Ok(())
    }

    fn has(&self, capability: Capability) -> bool {
        !self.script.without.contains(&capability)
    }

    fn stream(&self, location: &str) -> ContentStream {
        Box::new(io::Cursor::new(location.as_bytes().to_vec()))
    }
}

#[async_trait]
impl ContentProvider for ScriptedProvider {
    async fn initialize(&mut self, configuration: &Configuration) -> AdapterResult<()> {
        self.name = configuration.require("name")?.to_string();
        self.script = self.scripts.get(&self.name).cloned().unwrap_or_default();
        self.call("initialize")
    }

    async fn shutdown(&self) -> AdapterResult<()> {
        self.call("shutdown")
    }

    async fn test_connection(&self) -> AdapterResult<()> {
        self.call("test_connection")
    }

    fn progress_weight(&self) -> ProgressWeight {
        self.script.weight.unwrap_or_default()
    }

    fn as_repo_source(&self) -> Option<&dyn RepoSource> {
        self.has(Capability::RepoSource).then_some(self as &dyn RepoSource)
    }

    fn as_package_source(&self) -> Option<&dyn PackageSource> {
        self.has(Capability::PackageSource).then_some(self as &dyn PackageSource)
    }

    fn as_distribution_source(&self) -> Option<&dyn DistributionSource> {
        self.has(Capability::DistributionSource)
            .then_some(self as &dyn DistributionSource)
    }

    fn as_advisory_source(&self) -> Option<&dyn AdvisorySource> {
        self.has(Capability::AdvisorySource).then_some(self as &dyn AdvisorySource)
    }
}

#[async_trait]
impl RepoSource for ScriptedProvider {
    async fn import_repos(&self) -> AdapterResult<RepoImportReport> {
        self.call("import_repos")?;
        if let Some(delay) = self.script.import_delay {
            tokio::time::sleep(delay).await;
        }
        let mut report = RepoImportReport::default();
        for repo in &self.script.repos {
            report.add_repo(RepoDetails::new(*repo));
        }
        Ok(report)
    }
}

#[async_trait]
impl PackageSource for ScriptedProvider {
    async fn synchronize_packages(
        &self,
        _repo_name: &str,
        report: &mut PackageSyncReport,
        existing: &[PackageDetails],
    ) -> AdapterResult<()> {
        self.call("synchronize_packages")?;
        for index in 0..self.script.packages {
            let package = PackageDetails::new(
                PackageKey {
                    name: format!("{}-pkg-{}", self.name, index),
                    version: "1.0".to_string(),
                    package_type: "rpm".to_string(),
                    architecture: "noarch".to_string(),
                },
                format!("{}-pkg-{}.rpm", self.name, index),
                format!("{}/packages/{}", self.name, index),
            );
            if !existing.iter().any(|known| known.key == package.key) {
                report.add_new_package(package);
            }
        }

        if let Some(store) = &self.script.cancel_after_package_metadata {
            store
                .request_cancel(REPO)
                .await
                .map_err(|e| AdapterError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn open_package_bits(&self, location: &str) -> AdapterResult<Option<ContentStream>> {
        self.call("open_package_bits")?;
        if self.opens.fetch_add(1, Ordering::SeqCst) < self.script.transport_failures {
            return Err(AdapterError::Transport(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        if self.script.null_stream {
            return Ok(None);
        }
        Ok(Some(self.stream(location)))
    }
}

#[async_trait]
impl DistributionSource for ScriptedProvider {
    async fn synchronize_distributions(
        &self,
        _repo_name: &str,
        report: &mut DistributionSyncReport,
        existing: &[DistributionDetails],
    ) -> AdapterResult<()> {
        self.call("synchronize_distributions")?;
        for index in 0..self.script.distributions {
            let label = format!("{}-dist-{}", self.name, index);
            if existing.iter().any(|known| known.label == label) {
                continue;
            }
            let mut distribution =
                DistributionDetails::new(label, format!("{}/dists/{}", self.name, index), "kickstart");
            distribution.files.push(DistributionFileDetails {
                relative_filename: "treeinfo".to_string(),
                sha256: None,
                last_modified: None,
                file_size: None,
            });
            report.add_new_distribution(distribution);
        }
        Ok(())
    }

    async fn open_distribution_bits(&self, location: &str) -> AdapterResult<Option<ContentStream>> {
        self.call("open_distribution_bits")?;
        Ok(Some(self.stream(location)))
    }
}

#[async_trait]
impl AdvisorySource for ScriptedProvider {
    async fn synchronize_advisories(
        &self,
        _repo_name: &str,
        report: &mut AdvisorySyncReport,
        existing: &[AdvisoryDetails],
    ) -> AdapterResult<()> {
        self.call("synchronize_advisories")?;
        for index in 0..self.script.advisories {
            let id = format!("{}-ADV-{}", self.name, index);
            if !existing.iter().any(|known| known.advisory == id) {
                report.add_new_advisory(AdvisoryDetails::new(id, "bugfix", "Fixes things"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub store: Arc<InMemoryRecordStore>,
    /// The store the manager actually talks to
    pub faults: Arc<FaultyStore>,
    pub manager: ContentProviderManager,
    pub journal: Arc<Journal>,
    pub clock: Arc<FixedClock>,
    pub sources: Vec<ContentSource>,
}

impl Harness {
    pub fn source_id(&self, name: &str) -> ContentSourceId {
        self.sources
            .iter()
            .find(|source| source.name == name)
            .map(|source| source.id)
            .unwrap()
    }
}

/// Engine over a fresh store with repo `R1` backed by one source per script
pub async fn harness(scripts: Vec<(&str, Script)>) -> Harness {
    harness_with(Arc::new(InMemoryRecordStore::new()), scripts).await
}

pub async fn harness_with(store: Arc<InMemoryRecordStore>, scripts: Vec<(&str, Script)>) -> Harness {
    let journal = Arc::new(Journal::default());
    let mut repo = Repo::new(REPO, "R1");
    let mut sources = Vec::new();
    for (index, (name, _)) in scripts.iter().enumerate() {
        let source = ContentSource::new(
            index as i64 + 1,
            *name,
            ContentSourceType::new("scripted"),
            Configuration::new().with("name", *name),
        );
        repo = repo.with_source(source.clone());
        sources.push(source);
    }
    store.save_repo(repo).await;

    let scripts: Arc<HashMap<String, Script>> = Arc::new(
        scripts
            .into_iter()
            .map(|(name, script)| (name.to_string(), script))
            .collect(),
    );
    let clock = Arc::new(FixedClock::new(epoch()));
    let factory_journal = journal.clone();
    let faults = Arc::new(FaultyStore::new(store.clone()));
    let record_store: Arc<dyn RecordStore> = faults.clone();
    let manager = ContentProviderManager::builder(record_store)
        .config(EngineConfig::default())
        .clock(clock.clone())
        .register_factory(Arc::new(FnAdapterFactory::new("scripted", move || {
            Box::new(ScriptedProvider::new(scripts.clone(), factory_journal.clone()))
                as Box<dyn ContentProvider>
        })))
        .build()
        .unwrap();
    manager.initialize().await.unwrap();

    Harness {
        store,
        faults,
        manager,
        journal,
        clock,
        sources,
    }
}

// ============================================================================
// Failing record store
// ============================================================================

/// Delegates to an in-memory store, failing the operations it is told to
pub struct FaultyStore {
    inner: Arc<InMemoryRecordStore>,
    failing: Mutex<Vec<&'static str>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryRecordStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().push(operation);
    }

    fn check(&self, operation: &'static str) -> bridge_traits::error::Result<()> {
        if self.failing.lock().unwrap().contains(&operation) {
            Err(BridgeError::DatabaseError("database is locked".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn load_source(
        &self,
        id: ContentSourceId,
    ) -> bridge_traits::error::Result<Option<ContentSource>> {
        self.check("load_source")?;
        self.inner.load_source(id).await
    }

    async fn load_sources(&self) -> bridge_traits::error::Result<Vec<ContentSource>> {
        self.check("load_sources")?;
        self.inner.load_sources().await
    }

    async fn load_repo(&self, id: RepoId) -> bridge_traits::error::Result<Option<Repo>> {
        self.check("load_repo")?;
        self.inner.load_repo(id).await
    }

    async fn create_sync_result(
        &self,
        result: SyncResult,
    ) -> bridge_traits::error::Result<Option<SyncResult>> {
        self.check("create_sync_result")?;
        self.inner.create_sync_result(result).await
    }

    async fn merge_sync_result(
        &self,
        result: SyncResult,
    ) -> bridge_traits::error::Result<SyncResult> {
        self.check("merge_sync_result")?;
        self.inner.merge_sync_result(result).await
    }

    async fn load_latest_sync_result(
        &self,
        target: SyncTarget,
    ) -> bridge_traits::error::Result<Option<SyncResult>> {
        self.check("load_latest_sync_result")?;
        self.inner.load_latest_sync_result(target).await
    }

    async fn load_sync_result(
        &self,
        id: SyncResultId,
    ) -> bridge_traits::error::Result<Option<SyncResult>> {
        self.check("load_sync_result")?;
        self.inner.load_sync_result(id).await
    }

    async fn request_cancel(&self, repo: RepoId) -> bridge_traits::error::Result<bool> {
        self.check("request_cancel")?;
        self.inner.request_cancel(repo).await
    }

    async fn import_candidate_repos(
        &self,
        source: ContentSourceId,
        report: &RepoImportReport,
    ) -> bridge_traits::error::Result<usize> {
        self.check("import_candidate_repos")?;
        self.inner.import_candidate_repos(source, report).await
    }

    async fn list_packages(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> bridge_traits::error::Result<Vec<PackageDetails>> {
        self.check("list_packages")?;
        self.inner.list_packages(repo, source).await
    }

    async fn merge_package_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &PackageSyncReport,
    ) -> bridge_traits::error::Result<()> {
        self.check("merge_package_report")?;
        self.inner.merge_package_report(repo, source, report).await
    }

    async fn packages_missing_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> bridge_traits::error::Result<Vec<PackageDetails>> {
        self.check("packages_missing_bits")?;
        self.inner.packages_missing_bits(repo, source).await
    }

    async fn save_package_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        key: &PackageKey,
        bits: Bytes,
    ) -> bridge_traits::error::Result<()> {
        self.check("save_package_bits")?;
        self.inner.save_package_bits(repo, source, key, bits).await
    }

    async fn list_distributions(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> bridge_traits::error::Result<Vec<DistributionDetails>> {
        self.check("list_distributions")?;
        self.inner.list_distributions(repo, source).await
    }

    async fn merge_distribution_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &DistributionSyncReport,
    ) -> bridge_traits::error::Result<()> {
        self.check("merge_distribution_report")?;
        self.inner.merge_distribution_report(repo, source, report).await
    }

    async fn distribution_files_missing_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> bridge_traits::error::Result<Vec<DistributionFileRef>> {
        self.check("distribution_files_missing_bits")?;
        self.inner.distribution_files_missing_bits(repo, source).await
    }

    async fn save_distribution_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        file: &DistributionFileRef,
        bits: Bytes,
    ) -> bridge_traits::error::Result<()> {
        self.check("save_distribution_bits")?;
        self.inner.save_distribution_bits(repo, source, file, bits).await
    }

    async fn list_advisories(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> bridge_traits::error::Result<Vec<AdvisoryDetails>> {
        self.check("list_advisories")?;
        self.inner.list_advisories(repo, source).await
    }

    async fn merge_advisory_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &AdvisorySyncReport,
    ) -> bridge_traits::error::Result<()> {
        self.check("merge_advisory_report")?;
        self.inner.merge_advisory_report(repo, source, report).await
    }
}
