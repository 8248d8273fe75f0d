use bridge_traits::AdvisorySyncReport;
use tracing::instrument;

use super::PhaseContext;
use crate::tracker::SyncTracker;
use crate::Result;

#[instrument(skip_all, fields(repo = %context.repo.name, source = %context.source.name))]
pub(crate) async fn synchronize_metadata(
    context: &PhaseContext<'_>,
    tracker: &mut SyncTracker,
) -> Result<()> {
    let (repo_id, source_id) = (context.repo.id, context.source.id);
    let weight = context.adapter.progress_weight().advisory_metadata;

    context.progress(tracker, "Getting currently known list of advisories...");
    let existing = context.store.list_advisories(repo_id, source_id).await?;

    let mut report = AdvisorySyncReport::default();
    context
        .adapter
        .synchronize_advisories(&context.repo.name, &mut report, &existing)
        .await?;
    tracker.add_weighted_work(weight, report.len());

    context.progress(
        tracker,
        format!(
            "Advisory metadata synchronized: new=[{}], updated=[{}], deleted=[{}]",
            report.new_advisories.len(),
            report.updated_advisories.len(),
            report.deleted_advisories.len()
        ),
    );

    context
        .store
        .merge_advisory_report(repo_id, source_id, &report)
        .await?;
    tracker.finish_weighted_work(weight, report.len())?;
    Ok(())
}
