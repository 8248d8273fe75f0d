//! Package metadata and package bits.

use bridge_traits::PackageSyncReport;
use tracing::instrument;

use super::PhaseContext;
use crate::streaming::{fetch_with_retry, BitsKind};
use crate::tracker::SyncTracker;
use crate::Result;

/// Diff the source's packages against the known ones and merge the report.
#[instrument(skip_all, fields(repo = %context.repo.name, source = %context.source.name))]
pub(crate) async fn synchronize_metadata(
    context: &PhaseContext<'_>,
    tracker: &mut SyncTracker,
) -> Result<()> {
    let (repo_id, source_id) = (context.repo.id, context.source.id);
    let weight = context.adapter.progress_weight().package_metadata;

    context.progress(tracker, "Getting currently known list of content source packages...");
    let existing = context.store.list_packages(repo_id, source_id).await?;
    context.progress(
        tracker,
        format!("Loaded existing list of size=[{}]", existing.len()),
    );

    let mut report = PackageSyncReport::default();
    context
        .adapter
        .synchronize_packages(&context.repo.name, &mut report, &existing)
        .await?;
    tracker.add_weighted_work(weight, report.len());

    context.progress(
        tracker,
        format!(
            "Content source package metadata synchronized: new=[{}], updated=[{}], deleted=[{}]",
            report.new_packages.len(),
            report.updated_packages.len(),
            report.deleted_packages.len()
        ),
    );
    if let Some(summary) = &report.summary {
        context.progress(tracker, summary);
    }

    context
        .store
        .merge_package_report(repo_id, source_id, &report)
        .await?;
    tracker.finish_weighted_work(weight, report.len())?;

    let missing = context
        .store
        .packages_missing_bits(repo_id, source_id)
        .await?;
    context.progress(
        tracker,
        format!("[{}] packages are missing their bits", missing.len()),
    );
    Ok(())
}

/// Download and store the bits of every package that does not have them yet.
///
/// The pipeline has already queued this work on the tracker.
#[instrument(skip_all, fields(repo = %context.repo.name, source = %context.source.name))]
pub(crate) async fn synchronize_bits(
    context: &PhaseContext<'_>,
    tracker: &mut SyncTracker,
) -> Result<()> {
    let (repo_id, source_id) = (context.repo.id, context.source.id);
    let weight = context.adapter.progress_weight().package_bits;

    let missing = context
        .store
        .packages_missing_bits(repo_id, source_id)
        .await?;
    if missing.is_empty() {
        context.progress(tracker, "All packages already have their bits");
        return Ok(());
    }

    context.progress(
        tracker,
        format!("Downloading bits for [{}] packages...", missing.len()),
    );

    for package in &missing {
        let bits = fetch_with_retry(
            context.adapter,
            BitsKind::Package,
            &package.location,
            context.retry,
        )
        .await?;
        context
            .store
            .save_package_bits(repo_id, source_id, &package.key, bits)
            .await?;
        tracker.finish_weighted_work(weight, 1)?;
        tracker.persist_results().await?;
    }

    context.progress(
        tracker,
        format!("Downloaded bits for [{}] packages", missing.len()),
    );
    Ok(())
}
