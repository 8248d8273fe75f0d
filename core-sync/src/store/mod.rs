//! Record store implementations.
//!
//! Both stores apply the same sync result merge rules through
//! [`apply_merge_rules`].

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use bridge_traits::error::Result;
use bridge_traits::{BridgeError, SyncResult, SyncStatus};

/// Merge `incoming` over `stored`, returning the copy to persist
pub(crate) fn apply_merge_rules(stored: &SyncResult, mut incoming: SyncResult) -> Result<SyncResult> {
    if stored.status.is_terminal() && incoming.status != stored.status {
        return Err(BridgeError::Conflict(format!(
            "sync result {} is already {} and cannot become {}",
            stored.id, stored.status, incoming.status
        )));
    }

    if stored.status == SyncStatus::Cancelling && !incoming.status.is_terminal() {
        incoming.status = SyncStatus::Cancelling;
    }

    incoming.target = stored.target;
    incoming.version = stored.version + 1;
    Ok(incoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{RepoId, SyncTarget};
    use chrono::Utc;

    #[test]
    fn test_terminal_status_is_frozen() {
        let mut stored = SyncResult::new(SyncTarget::Repo(RepoId(1)), Utc::now());
        stored.status = SyncStatus::Success;

        let mut stamped = stored.clone();
        stamped.end_time = Some(Utc::now());
        let merged = apply_merge_rules(&stored, stamped).unwrap();
        assert_eq!(merged.version, 1);

        let mut failed = stored.clone();
        failed.status = SyncStatus::Failure;
        assert!(matches!(
            apply_merge_rules(&stored, failed),
            Err(BridgeError::Conflict(_))
        ));
    }

    #[test]
    fn test_cancelling_survives_progress_writes() {
        let mut stored = SyncResult::new(SyncTarget::Repo(RepoId(1)), Utc::now());
        stored.status = SyncStatus::Cancelling;

        let mut progress = stored.clone();
        progress.status = SyncStatus::DistroBits;
        progress.percent_complete = 40;
        let merged = apply_merge_rules(&stored, progress).unwrap();
        assert_eq!(merged.status, SyncStatus::Cancelling);
        assert_eq!(merged.percent_complete, 40);

        let mut cancelled = stored.clone();
        cancelled.status = SyncStatus::Cancelled;
        assert_eq!(
            apply_merge_rules(&stored, cancelled).unwrap().status,
            SyncStatus::Cancelled
        );
    }
}
