//! Per-source phase bodies.
//!
//! Each synchronizer runs one phase for one (repo, content source) pair. They
//! share a [`PhaseContext`] and account their work on the run's
//! [`SyncTracker`]. Ordering, cancellation and fault isolation belong to the
//! pipeline, not to the synchronizers.

pub mod advisory;
pub mod distribution;
pub mod package;
pub mod repo_source;

use std::sync::Arc;

use bridge_traits::{Clock, ContentSource, RecordStore, Repo};
use tracing::{debug, info};

use crate::isolation::IsolatedAdapter;
use crate::phase::SyncPhase;
use crate::retry::RetryPolicy;
use crate::tracker::SyncTracker;
use crate::Result;

/// Everything a phase body needs for one (repo, content source) pair
pub(crate) struct PhaseContext<'a> {
    pub repo: &'a Repo,
    pub source: &'a ContentSource,
    pub adapter: &'a IsolatedAdapter,
    pub store: &'a Arc<dyn RecordStore>,
    pub clock: &'a dyn Clock,
    pub retry: &'a RetryPolicy,
}

impl PhaseContext<'_> {
    /// Log `message` and append it, timestamped, to the run's progress log
    pub fn progress(&self, tracker: &mut SyncTracker, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("[{}] [{}] {}", self.repo.name, self.source.name, message);
        tracker.append_results(format!("{}: {}", self.clock.now().to_rfc3339(), message));
    }
}

/// Run `phase` for the context's source. Sources lacking the phase's
/// capability are skipped.
pub(crate) async fn run_phase(
    phase: SyncPhase,
    context: &PhaseContext<'_>,
    tracker: &mut SyncTracker,
) -> Result<()> {
    if !context.adapter.supports(phase.capability()) {
        debug!(
            "Content source [{}] does not support {}, skipping {}",
            context.source.name,
            phase.capability(),
            phase
        );
        return Ok(());
    }

    match phase {
        SyncPhase::PackageMetadata => package::synchronize_metadata(context, tracker).await,
        SyncPhase::PackageBits => package::synchronize_bits(context, tracker).await,
        SyncPhase::DistributionMetadata => {
            distribution::synchronize_metadata(context, tracker).await
        }
        SyncPhase::DistributionBits => distribution::synchronize_bits(context, tracker).await,
        SyncPhase::AdvisoryMetadata => advisory::synchronize_metadata(context, tracker).await,
    }
}
