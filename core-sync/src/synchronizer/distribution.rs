//! Distribution trees and their files.

use bridge_traits::DistributionSyncReport;
use tracing::instrument;

use super::PhaseContext;
use crate::streaming::{fetch_with_retry, BitsKind};
use crate::tracker::SyncTracker;
use crate::Result;

#[instrument(skip_all, fields(repo = %context.repo.name, source = %context.source.name))]
pub(crate) async fn synchronize_metadata(
    context: &PhaseContext<'_>,
    tracker: &mut SyncTracker,
) -> Result<()> {
    let (repo_id, source_id) = (context.repo.id, context.source.id);
    let weight = context.adapter.progress_weight().distribution_metadata;

    context.progress(tracker, "Getting currently known list of distributions...");
    let existing = context.store.list_distributions(repo_id, source_id).await?;

    let mut report = DistributionSyncReport::default();
    context
        .adapter
        .synchronize_distributions(&context.repo.name, &mut report, &existing)
        .await?;
    tracker.add_weighted_work(weight, report.len());

    context.progress(
        tracker,
        format!(
            "Distribution metadata synchronized: new=[{}], deleted=[{}]",
            report.new_distributions.len(),
            report.deleted_distributions.len()
        ),
    );
    if let Some(summary) = &report.summary {
        context.progress(tracker, summary);
    }

    context
        .store
        .merge_distribution_report(repo_id, source_id, &report)
        .await?;
    tracker.finish_weighted_work(weight, report.len())?;
    Ok(())
}

#[instrument(skip_all, fields(repo = %context.repo.name, source = %context.source.name))]
pub(crate) async fn synchronize_bits(
    context: &PhaseContext<'_>,
    tracker: &mut SyncTracker,
) -> Result<()> {
    let (repo_id, source_id) = (context.repo.id, context.source.id);
    let weight = context.adapter.progress_weight().distribution_bits;

    let missing = context
        .store
        .distribution_files_missing_bits(repo_id, source_id)
        .await?;
    if missing.is_empty() {
        return Ok(());
    }

    context.progress(
        tracker,
        format!("Downloading [{}] distribution files...", missing.len()),
    );

    for file in &missing {
        let bits = fetch_with_retry(
            context.adapter,
            BitsKind::DistributionFile,
            &file.location(),
            context.retry,
        )
        .await?;
        context
            .store
            .save_distribution_bits(repo_id, source_id, file, bits)
            .await?;
        tracker.finish_weighted_work(weight, 1)?;
        tracker.persist_results().await?;
    }

    context.progress(
        tracker,
        format!("Downloaded [{}] distribution files", missing.len()),
    );
    Ok(())
}
