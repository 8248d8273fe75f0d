//! # Sync Progress Tracker
//!
//! Accumulates weighted units of work for one synchronization run and
//! persists status snapshots through the record store.
//!
//! ## Overview
//!
//! Each phase adds `weight × item count` units of work when it learns how
//! much there is to do and finishes them as it goes. Percent-complete is
//! `floor(100 × finished / total)` and is only meaningful inside one phase
//! group: the pipeline calls [`SyncTracker::reset_to_zero`] between groups.
//!
//! ```rust,ignore
//! let mut tracker = SyncTracker::new(store, result);
//! tracker.start();
//! tracker.add_work(15);
//! tracker.finish_work(10)?;
//! assert_eq!(tracker.percent_complete()?, 66);
//! tracker.persist_results().await?;
//! ```

use std::sync::Arc;

use bridge_traits::{RecordStore, SyncResult, SyncStatus};
use tracing::debug;

use crate::{Result, SyncError};

pub struct SyncTracker {
    store: Arc<dyn RecordStore>,
    result: SyncResult,
    started: bool,
    total_work: u64,
    finished_work: u64,
    /// Set when a (phase, source) pair failed and the run continued
    failed: bool,
}

impl SyncTracker {
    pub fn new(store: Arc<dyn RecordStore>, result: SyncResult) -> Self {
        Self {
            store,
            result,
            started: false,
            total_work: 0,
            finished_work: 0,
            failed: false,
        }
    }

    /// Zero both counters and begin accounting
    pub fn start(&mut self) {
        self.total_work = 0;
        self.finished_work = 0;
        self.started = true;
    }

    pub fn stop(&mut self) {
        self.started = false;
    }

    pub fn reset_to_zero(&mut self) {
        self.stop();
        self.start();
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn add_work(&mut self, units: u64) {
        self.total_work += units;
        debug!(
            "addWork - ADD: {} Total work: [{}] Finished work: [{}]",
            units, self.total_work, self.finished_work
        );
    }

    /// # Errors
    ///
    /// Returns `IllegalState` if the tracker has not been started.
    pub fn finish_work(&mut self, units: u64) -> Result<()> {
        self.ensure_started()?;
        self.finished_work += units;
        debug!(
            "finishWork - REM: {} Total work: [{}] Finished work: [{}]",
            units, self.total_work, self.finished_work
        );
        Ok(())
    }

    pub fn set_total_work(&mut self, units: u64) {
        self.total_work = units;
    }

    pub fn total_work(&self) -> u64 {
        self.total_work
    }

    pub fn finished_work(&self) -> u64 {
        self.finished_work
    }

    /// Truncated, not rounded. Not capped at 100.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the tracker has not been started.
    pub fn percent_complete(&self) -> Result<u32> {
        self.ensure_started()?;
        if self.total_work == 0 {
            return Ok(0);
        }
        let percent = self.finished_work.saturating_mul(100) / self.total_work;
        Ok(u32::try_from(percent).unwrap_or(u32::MAX))
    }

    /// Add `weight × count` units
    pub fn add_weighted_work(&mut self, weight: u32, count: usize) {
        self.add_work(weighted(weight, count));
    }

    /// Finish `weight × count` units
    pub fn finish_weighted_work(&mut self, weight: u32, count: usize) -> Result<()> {
        self.finish_work(weighted(weight, count))
    }

    // ------------------------------------------------------------------
    // Sync result access
    // ------------------------------------------------------------------

    pub fn result(&self) -> &SyncResult {
        &self.result
    }

    /// Replace the working copy, e.g. with one reloaded from the store
    pub fn set_result(&mut self, result: SyncResult) {
        self.result = result;
    }

    pub fn status(&self) -> SyncStatus {
        self.result.status
    }

    pub fn set_status(&mut self, status: SyncStatus) {
        self.result.status = status;
    }

    pub fn append_results(&mut self, line: impl AsRef<str>) {
        self.result.append_results(line);
    }

    /// Record that a phase failed for one source while the run continues
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Write percent-complete and the result through the record store,
    /// keeping the returned copy as the canonical one.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker is stopped or the store rejects the merge.
    pub async fn persist_results(&mut self) -> Result<()> {
        self.result.percent_complete = self.percent_complete()?;
        let stored = self.store.merge_sync_result(self.result.clone()).await?;
        self.result = stored;
        Ok(())
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(SyncError::IllegalState(
                "SyncTracker not started yet. call start() to set progress to 0 and start watching."
                    .to_string(),
            ))
        }
    }
}

fn weighted(weight: u32, count: usize) -> u64 {
    u64::from(weight).saturating_mul(count as u64)
}
