//! Candidate repository discovery, the body of a content source sync.

use std::sync::Arc;

use bridge_traits::{Capability, Clock, ContentSource, RecordStore, SyncResult};
use tracing::{info, instrument};

use crate::isolation::IsolatedAdapter;
use crate::Result;

fn append(result: &mut SyncResult, clock: &dyn Clock, message: &str) {
    result.append_results(format!("{}: {}", clock.now().to_rfc3339(), message));
}

/// Import the repositories the source advertises as candidates.
///
/// Progress lines go to `result`, which is merged after every step so
/// observers can follow along. Returns how many candidates were new.
#[instrument(skip_all, fields(source = %source.name))]
pub(crate) async fn import_candidate_repos(
    source: &ContentSource,
    adapter: &IsolatedAdapter,
    store: &Arc<dyn RecordStore>,
    clock: &dyn Clock,
    result: &mut SyncResult,
) -> Result<usize> {
    let start = format!(
        "Start synchronization of content source [{}]",
        source.name
    );
    info!("{}", start);
    append(result, clock, &start);
    *result = store.merge_sync_result(result.clone()).await?;

    if !adapter.supports(Capability::RepoSource) {
        append(
            result,
            clock,
            "Content source does not advertise repositories, nothing to import",
        );
        return Ok(0);
    }

    append(result, clock, "Importing candidate repositories...");
    *result = store.merge_sync_result(result.clone()).await?;

    let report = adapter.import_repos().await?;
    let imported = store.import_candidate_repos(source.id, &report).await?;

    let done = format!(
        "Imported [{}] candidate repositories out of [{}] reported",
        imported,
        report.repos.len()
    );
    info!("{}", done);
    append(result, clock, &done);
    Ok(imported)
}
