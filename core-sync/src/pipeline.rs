//! # Repository Synchronization Pipeline
//!
//! Drives one repository through every phase against every attached content
//! source.
//!
//! ## Workflow
//!
//! 1. Load the repo and create its `INPROGRESS` sync result; bail out with
//!    `false` when a non-terminal result already exists
//! 2. Run the phase groups in order, phase-major: each phase finishes for
//!    every source before the next phase starts
//! 3. Around every (phase, source) pair, poll the persisted status for a
//!    `CANCELLING` request
//! 4. An adapter-side failure of a pair is logged and recorded, and the run
//!    carries on with the remaining sources and phases. Record store and
//!    engine failures abort the run and are persisted as `FAILURE`
//! 5. Stamp the end time and persist the final result whatever the outcome
//!
//! The single-flight check relies on the persisted record, not on a lock, so
//! two processes starting the same repo at the same instant may both run.

use std::sync::Arc;

use bridge_traits::{
    Clock, ContentSource, RecordStore, Repo, RepoId, SyncResult, SyncStatus, SyncTarget,
};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use tracing::{debug, error, info, instrument, warn};

use crate::error::format_error_chain;
use crate::phase::{SyncPhase, PHASE_GROUPS};
use crate::registry::AdapterRegistry;
use crate::retry::RetryPolicy;
use crate::synchronizer::{self, PhaseContext};
use crate::tracker::SyncTracker;
use crate::{Result, SyncError};

pub(crate) struct RepoPipeline<'a> {
    pub registry: &'a AdapterRegistry,
    pub store: &'a Arc<dyn RecordStore>,
    pub clock: &'a dyn Clock,
    pub retry: &'a RetryPolicy,
    pub event_bus: Option<&'a EventBus>,
}

impl RepoPipeline<'_> {
    #[instrument(skip(self), fields(repo_id = %repo_id))]
    pub async fn run(&self, repo_id: RepoId) -> Result<bool> {
        let repo = self.store.load_repo(repo_id).await?.ok_or_else(|| {
            SyncError::InvalidArgument(format!("Invalid repo ID specified for sync: {}", repo_id))
        })?;

        let target = SyncTarget::Repo(repo.id);
        let Some(created) = self
            .store
            .create_sync_result(SyncResult::new(target, self.clock.now()))
            .await?
        else {
            info!(
                "Repository [{}] is already currently being synchronized, this sync request will be ignored",
                repo.name
            );
            return Ok(false);
        };

        info!("Start synchronization of repository [{}]", repo.name);
        self.emit(SyncEvent::Started {
            target,
            result_id: created.id.as_str(),
        });

        let mut tracker = SyncTracker::new(self.store.clone(), created);
        tracker.start();

        let outcome = match self.run_phases(&repo, &mut tracker).await {
            Ok(()) => self.complete(&repo, &mut tracker).await,
            Err(e) if e.is_interrupted() => self.cancel(&repo, &mut tracker).await,
            Err(e) => self.fail(&repo, &mut tracker, e).await,
        };

        // Always leave an end-stamped record behind
        let mut last = tracker.result().clone();
        last.end_time = Some(self.clock.now());
        if let Err(e) = self.store.merge_sync_result(last).await {
            error!(
                "Failed to persist final sync result of repository [{}]: {}",
                repo.name, e
            );
            if outcome.is_ok() {
                return Err(e.into());
            }
        }

        outcome
    }

    async fn run_phases(&self, repo: &Repo, tracker: &mut SyncTracker) -> Result<()> {
        for (index, group) in PHASE_GROUPS.iter().enumerate() {
            if index > 0 {
                tracker.reset_to_zero();
                tracker.persist_results().await?;
            }

            for phase in group.iter().copied() {
                info!("Synchronizing {} of repository [{}]", phase, repo.name);
                self.queue_bits_work(repo, phase, tracker).await?;
                for source in &repo.content_sources {
                    self.check_cancel(repo).await?;
                    self.run_pair(repo, source, phase, tracker).await?;
                    self.check_cancel(repo).await?;
                }
            }
        }
        Ok(())
    }

    /// Account the missing bits of every source before any of them starts
    /// downloading, so the phase's percent never drops between sources.
    async fn queue_bits_work(
        &self,
        repo: &Repo,
        phase: SyncPhase,
        tracker: &mut SyncTracker,
    ) -> Result<()> {
        if !phase.is_bits() {
            return Ok(());
        }

        for source in &repo.content_sources {
            // An unmanaged source fails in its own pair
            let Ok(adapter) = self.registry.resolve(source.id).await else {
                continue;
            };
            if !adapter.supports(phase.capability()) {
                continue;
            }

            let weight = adapter.progress_weight();
            let (weight, missing) = match phase {
                SyncPhase::PackageBits => (
                    weight.package_bits,
                    self.store
                        .packages_missing_bits(repo.id, source.id)
                        .await?
                        .len(),
                ),
                _ => (
                    weight.distribution_bits,
                    self.store
                        .distribution_files_missing_bits(repo.id, source.id)
                        .await?
                        .len(),
                ),
            };
            tracker.add_weighted_work(weight, missing);
        }
        tracker.persist_results().await
    }

    /// Run one (phase, source) pair. Adapter-side failures are recorded
    /// against the source; anything else escapes to the run boundary.
    async fn run_pair(
        &self,
        repo: &Repo,
        source: &ContentSource,
        phase: SyncPhase,
        tracker: &mut SyncTracker,
    ) -> Result<()> {
        self.emit(SyncEvent::PhaseStarted {
            repo_id: repo.id,
            source_id: source.id,
            phase: phase.as_str().to_string(),
        });

        match self.execute_pair(repo, source, phase, tracker).await {
            Ok(()) => {
                tracker.persist_results().await?;
                self.emit(SyncEvent::Progress {
                    target: SyncTarget::Repo(repo.id),
                    status: tracker.status(),
                    percent: tracker.result().percent_complete,
                });
                Ok(())
            }
            Err(cause) if cause.is_source_failure() => {
                let failure = SyncError::Synchronization {
                    repo_name: repo.name.clone(),
                    source_name: source.name.clone(),
                    phase,
                    cause: Box::new(cause),
                };
                let trace = format_error_chain(&failure);
                error!("{}", trace);
                tracker.append_results(format!("{}: {}", self.clock.now().to_rfc3339(), trace));
                tracker.mark_failed();
                tracker.persist_results().await
            }
            Err(e) => Err(e),
        }
    }

    async fn execute_pair(
        &self,
        repo: &Repo,
        source: &ContentSource,
        phase: SyncPhase,
        tracker: &mut SyncTracker,
    ) -> Result<()> {
        let adapter = self.registry.resolve(source.id).await?;

        tracker.set_status(phase.status());
        tracker.persist_results().await?;

        let context = PhaseContext {
            repo,
            source,
            adapter: &adapter,
            store: self.store,
            clock: self.clock,
            retry: self.retry,
        };
        synchronizer::run_phase(phase, &context, tracker).await
    }

    async fn check_cancel(&self, repo: &Repo) -> Result<()> {
        let latest = self
            .store
            .load_latest_sync_result(SyncTarget::Repo(repo.id))
            .await?;

        match latest {
            Some(result) if result.status == SyncStatus::Cancelling => {
                debug!("Cancellation requested for repository [{}]", repo.name);
                Err(SyncError::Interrupted { repo_id: repo.id })
            }
            _ => Ok(()),
        }
    }

    async fn complete(&self, repo: &Repo, tracker: &mut SyncTracker) -> Result<bool> {
        let status = if tracker.has_failed() {
            warn!(
                "Repository [{}] completed syncing with content source failures",
                repo.name
            );
            SyncStatus::Failure
        } else {
            SyncStatus::Success
        };

        tracker.append_results(format!(
            "{}: Repository [{}] completed syncing.",
            self.clock.now().to_rfc3339(),
            repo.name
        ));
        tracker.set_status(status);
        tracker.persist_results().await?;

        info!("Repository [{}] completed syncing with status {}", repo.name, status);
        self.emit(SyncEvent::Completed {
            target: SyncTarget::Repo(repo.id),
            status,
        });
        Ok(true)
    }

    async fn cancel(&self, repo: &Repo, tracker: &mut SyncTracker) -> Result<bool> {
        info!("Synchronization of repository [{}] was cancelled", repo.name);

        tracker.append_results("\n ** Cancelled syncing **");
        tracker.reset_to_zero();
        tracker.set_status(SyncStatus::Cancelled);
        tracker.persist_results().await?;

        self.emit(SyncEvent::Cancelled { repo_id: repo.id });
        Ok(false)
    }

    async fn fail(&self, repo: &Repo, tracker: &mut SyncTracker, cause: SyncError) -> Result<bool> {
        let failure = SyncError::RepoSyncFailed {
            repo_id: repo.id,
            cause: Box::new(cause),
        };
        error!("{}", format_error_chain(&failure));

        // Another process may have moved the record along since our last write
        match self.store.load_sync_result(tracker.result().id).await {
            Ok(Some(latest)) => tracker.set_result(latest),
            Ok(None) => {}
            Err(e) => warn!("Failed to reload sync result of repository [{}]: {}", repo.name, e),
        }

        tracker.append_results(format!(
            "{}: SYNCHRONIZATION ERROR - STACK TRACE FOLLOWS:\n{}",
            self.clock.now().to_rfc3339(),
            format_error_chain(&failure)
        ));
        tracker.set_status(SyncStatus::Failure);
        if let Err(e) = tracker.persist_results().await {
            error!(
                "Failed to persist failure of repository [{}]: {}",
                repo.name, e
            );
        }

        self.emit(SyncEvent::Failed {
            target: SyncTarget::Repo(repo.id),
            message: failure.to_string(),
        });
        Err(failure)
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}
