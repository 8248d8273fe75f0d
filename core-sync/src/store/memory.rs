//! Process-local [`RecordStore`] for embedding and tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::{
    AdvisoryDetails, AdvisorySyncReport, BridgeError, ContentSource, ContentSourceId,
    DistributionDetails, DistributionFileRef, DistributionSyncReport, PackageDetails, PackageKey,
    PackageSyncReport, RecordStore, Repo, RepoDetails, RepoId, RepoImportReport, SyncResult,
    SyncResultId, SyncStatus, SyncTarget,
};
use bytes::Bytes;
use tokio::sync::Mutex;

use super::apply_merge_rules;

type Scope = (RepoId, ContentSourceId);

#[derive(Default)]
struct State {
    sources: BTreeMap<ContentSourceId, ContentSource>,
    repos: BTreeMap<RepoId, Repo>,
    /// Insertion ordered
    results: Vec<SyncResult>,
    candidate_repos: BTreeMap<(ContentSourceId, String), RepoDetails>,
    packages: HashMap<Scope, BTreeMap<PackageKey, PackageDetails>>,
    package_bits: HashMap<(Scope, PackageKey), Bytes>,
    distributions: HashMap<Scope, BTreeMap<String, DistributionDetails>>,
    /// Keyed by (label, relative filename)
    distribution_bits: HashMap<(Scope, String, String), Bytes>,
    advisories: HashMap<Scope, BTreeMap<String, AdvisoryDetails>>,
}

impl State {
    fn latest(&self, target: SyncTarget) -> Option<&SyncResult> {
        self.results
            .iter()
            .filter(|result| result.target == target)
            .max_by_key(|result| result.start_time)
    }
}

/// Stores everything in memory behind one async mutex
#[derive(Default)]
pub struct InMemoryRecordStore {
    state: Mutex<State>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a content source
    pub async fn save_source(&self, source: ContentSource) {
        self.state.lock().await.sources.insert(source.id, source);
    }

    /// Insert or replace a repo; its content sources are saved as well
    pub async fn save_repo(&self, repo: Repo) {
        let mut state = self.state.lock().await;
        for source in &repo.content_sources {
            state.sources.insert(source.id, source.clone());
        }
        state.repos.insert(repo.id, repo);
    }

    /// Every result recorded for `target`, oldest first
    pub async fn sync_results(&self, target: SyncTarget) -> Vec<SyncResult> {
        self.state
            .lock()
            .await
            .results
            .iter()
            .filter(|result| result.target == target)
            .cloned()
            .collect()
    }

    pub async fn candidate_repos(&self, source: ContentSourceId) -> Vec<RepoDetails> {
        self.state
            .lock()
            .await
            .candidate_repos
            .iter()
            .filter(|((owner, _), _)| *owner == source)
            .map(|(_, details)| details.clone())
            .collect()
    }

    pub async fn package_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        key: &PackageKey,
    ) -> Option<Bytes> {
        self.state
            .lock()
            .await
            .package_bits
            .get(&((repo, source), key.clone()))
            .cloned()
    }

    pub async fn distribution_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        file: &DistributionFileRef,
    ) -> Option<Bytes> {
        self.state
            .lock()
            .await
            .distribution_bits
            .get(&(
                (repo, source),
                file.label.clone(),
                file.file.relative_filename.clone(),
            ))
            .cloned()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load_source(&self, id: ContentSourceId) -> Result<Option<ContentSource>> {
        Ok(self.state.lock().await.sources.get(&id).cloned())
    }

    async fn load_sources(&self) -> Result<Vec<ContentSource>> {
        Ok(self.state.lock().await.sources.values().cloned().collect())
    }

    async fn load_repo(&self, id: RepoId) -> Result<Option<Repo>> {
        Ok(self.state.lock().await.repos.get(&id).cloned())
    }

    async fn create_sync_result(&self, result: SyncResult) -> Result<Option<SyncResult>> {
        let mut state = self.state.lock().await;
        let running = state
            .results
            .iter()
            .any(|existing| existing.target == result.target && !existing.is_terminal());
        if running {
            return Ok(None);
        }

        state.results.push(result.clone());
        Ok(Some(result))
    }

    async fn merge_sync_result(&self, result: SyncResult) -> Result<SyncResult> {
        let mut state = self.state.lock().await;
        let stored = state
            .results
            .iter_mut()
            .find(|existing| existing.id == result.id)
            .ok_or_else(|| BridgeError::NotFound(format!("sync result {}", result.id)))?;

        let merged = apply_merge_rules(stored, result)?;
        *stored = merged.clone();
        Ok(merged)
    }

    async fn load_latest_sync_result(&self, target: SyncTarget) -> Result<Option<SyncResult>> {
        Ok(self.state.lock().await.latest(target).cloned())
    }

    async fn load_sync_result(&self, id: SyncResultId) -> Result<Option<SyncResult>> {
        Ok(self
            .state
            .lock()
            .await
            .results
            .iter()
            .find(|result| result.id == id)
            .cloned())
    }

    async fn request_cancel(&self, repo: RepoId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(latest) = state.latest(SyncTarget::Repo(repo)).map(|result| result.id) else {
            return Ok(false);
        };

        match state.results.iter_mut().find(|result| result.id == latest) {
            Some(result) if !result.is_terminal() => {
                result.status = SyncStatus::Cancelling;
                result.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn import_candidate_repos(
        &self,
        source: ContentSourceId,
        report: &RepoImportReport,
    ) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut imported = 0;
        for details in &report.repos {
            let known = state.repos.values().any(|repo| repo.name == details.name);
            let key = (source, details.name.clone());
            if known || state.candidate_repos.contains_key(&key) {
                continue;
            }
            state.candidate_repos.insert(key, details.clone());
            imported += 1;
        }
        Ok(imported)
    }

    async fn list_packages(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<PackageDetails>> {
        Ok(self
            .state
            .lock()
            .await
            .packages
            .get(&(repo, source))
            .map(|packages| packages.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn merge_package_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &PackageSyncReport,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let scope = (repo, source);

        for package in &report.deleted_packages {
            if let Some(packages) = state.packages.get_mut(&scope) {
                packages.remove(&package.key);
            }
            state.package_bits.remove(&(scope, package.key.clone()));
        }
        // Updated packages need their bits downloaded again
        for package in &report.updated_packages {
            state.package_bits.remove(&(scope, package.key.clone()));
        }

        let packages = state.packages.entry(scope).or_default();
        for package in report.new_packages.iter().chain(&report.updated_packages) {
            packages.insert(package.key.clone(), package.clone());
        }
        Ok(())
    }

    async fn packages_missing_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<PackageDetails>> {
        let state = self.state.lock().await;
        let scope = (repo, source);
        Ok(state
            .packages
            .get(&scope)
            .map(|packages| {
                packages
                    .values()
                    .filter(|package| {
                        !state
                            .package_bits
                            .contains_key(&(scope, package.key.clone()))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_package_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        key: &PackageKey,
        bits: Bytes,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let scope = (repo, source);
        let known = state
            .packages
            .get(&scope)
            .is_some_and(|packages| packages.contains_key(key));
        if !known {
            return Err(BridgeError::NotFound(format!("package {}-{}", key.name, key.version)));
        }
        state.package_bits.insert((scope, key.clone()), bits);
        Ok(())
    }

    async fn list_distributions(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<DistributionDetails>> {
        Ok(self
            .state
            .lock()
            .await
            .distributions
            .get(&(repo, source))
            .map(|distributions| distributions.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn merge_distribution_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &DistributionSyncReport,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let scope = (repo, source);

        for distribution in &report.deleted_distributions {
            if let Some(distributions) = state.distributions.get_mut(&scope) {
                distributions.remove(&distribution.label);
            }
            state
                .distribution_bits
                .retain(|(owner, label, _), _| !(*owner == scope && *label == distribution.label));
        }

        let distributions = state.distributions.entry(scope).or_default();
        for distribution in &report.new_distributions {
            distributions.insert(distribution.label.clone(), distribution.clone());
        }
        Ok(())
    }

    async fn distribution_files_missing_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<DistributionFileRef>> {
        let state = self.state.lock().await;
        let scope = (repo, source);
        let Some(distributions) = state.distributions.get(&scope) else {
            return Ok(Vec::new());
        };

        let mut missing = Vec::new();
        for distribution in distributions.values() {
            for file in &distribution.files {
                let key = (
                    scope,
                    distribution.label.clone(),
                    file.relative_filename.clone(),
                );
                if !state.distribution_bits.contains_key(&key) {
                    missing.push(DistributionFileRef {
                        label: distribution.label.clone(),
                        dist_path: distribution.dist_path.clone(),
                        file: file.clone(),
                    });
                }
            }
        }
        Ok(missing)
    }

    async fn save_distribution_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        file: &DistributionFileRef,
        bits: Bytes,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let scope = (repo, source);
        let known = state
            .distributions
            .get(&scope)
            .is_some_and(|distributions| distributions.contains_key(&file.label));
        if !known {
            return Err(BridgeError::NotFound(format!("distribution {}", file.label)));
        }
        state.distribution_bits.insert(
            (scope, file.label.clone(), file.file.relative_filename.clone()),
            bits,
        );
        Ok(())
    }

    async fn list_advisories(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<AdvisoryDetails>> {
        Ok(self
            .state
            .lock()
            .await
            .advisories
            .get(&(repo, source))
            .map(|advisories| advisories.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn merge_advisory_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &AdvisorySyncReport,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let advisories = state.advisories.entry((repo, source)).or_default();

        for advisory in &report.deleted_advisories {
            advisories.remove(&advisory.advisory);
        }
        for advisory in report
            .new_advisories
            .iter()
            .chain(&report.updated_advisories)
        {
            advisories.insert(advisory.advisory.clone(), advisory.clone());
        }
        Ok(())
    }
}
