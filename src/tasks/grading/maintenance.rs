use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc as now_primitive;
use crate::repositories;

/// Submits active sessions whose timer and submit grace window ran out
/// without any API traffic.
pub(crate) async fn auto_submit_expired_sessions(state: &AppState) -> Result<usize> {
    let now = now_primitive();
    let grace = Duration::seconds(state.settings().exam().submit_grace_seconds as i64);
    let submitted = repositories::sessions::auto_submit_expired(state.db(), now - grace, now)
        .await
        .context("Failed to auto-submit expired sessions")?;

    if !submitted.is_empty() {
        metrics::counter!("sessions_auto_submitted_total", "path" => "worker")
            .increment(submitted.len() as u64);
        tracing::info!(count = submitted.len(), "Auto-submitted expired sessions");
    }

    Ok(submitted.len())
}

/// Puts sessions stuck in `grading` back into the queue.
pub(crate) async fn requeue_stale_grading(state: &AppState) -> Result<u64> {
    let now = now_primitive();
    let stale_minutes = state.settings().exam().grading_stale_minutes as i64;
    let cutoff = now - Duration::minutes(stale_minutes);

    let requeued = repositories::sessions::requeue_stale_grading(state.db(), cutoff, now)
        .await
        .context("Failed to requeue stale grading sessions")?;

    if requeued > 0 {
        tracing::warn!(count = requeued, stale_minutes, "Requeued stale grading sessions");
    }

    Ok(requeued)
}
