use std::time::Duration as StdDuration;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, ExamSession, User};
use crate::db::types::SessionStatus;
use crate::repositories;
use crate::schemas::session::{ReferenceFile, SessionResponse};
use crate::services::exam_timer;

pub(super) async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}

/// Loads a session that belongs to `user`.
pub(super) async fn fetch_own_session(
    state: &AppState,
    user: &User,
    session_id: &str,
) -> Result<ExamSession, ApiError> {
    let session = repositories::sessions::find_by_id(state.db(), session_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch session"))?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    if session.user_id != user.id {
        return Err(ApiError::Forbidden("Access denied"));
    }
    Ok(session)
}

/// Submits an active session once its timer and the submit grace window have
/// run out, stamped at its expiry. Returns the current row either way.
pub(super) async fn enforce_expiry(
    state: &AppState,
    session: ExamSession,
) -> Result<ExamSession, ApiError> {
    let now = primitive_now_utc();
    let grace = state.settings().exam().submit_grace_seconds;
    if session.status != SessionStatus::Active
        || !exam_timer::auto_submit_due(session.expires_at, now, grace)
    {
        return Ok(session);
    }

    let submitted_at = session.expires_at.unwrap_or(now);
    let submitted =
        repositories::sessions::submit(state.db(), &session.id, submitted_at, true, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to auto-submit session"))?;

    match submitted {
        Some(session) => {
            metrics::counter!("sessions_auto_submitted_total", "path" => "api").increment(1);
            tracing::info!(
                session_id = %session.id,
                exam_id = %session.exam_id,
                user_id = %session.user_id,
                "Expired session auto-submitted"
            );
            Ok(session)
        }
        // Someone else moved it first.
        None => repositories::sessions::fetch_one_by_id(state.db(), &session.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch session")),
    }
}

pub(super) async fn session_response(
    state: &AppState,
    exam: &Exam,
    session: ExamSession,
) -> Result<SessionResponse, ApiError> {
    let now = primitive_now_utc();
    let active = session.status == SessionStatus::Active;
    let time_remaining =
        if active { exam_timer::remaining_seconds(session.expires_at, now) } else { None };
    let references = if active && exam.allow_references {
        reference_files(state, &exam.id).await?
    } else {
        Vec::new()
    };

    Ok(SessionResponse::from_db(
        session,
        exam.name.clone(),
        time_remaining,
        state.settings().exam().auto_save_interval_seconds,
        references,
    ))
}

/// Short-lived download links for the exam's attachments. Empty without storage.
async fn reference_files(state: &AppState, exam_id: &str) -> Result<Vec<ReferenceFile>, ApiError> {
    let Some(storage) = state.storage() else {
        return Ok(Vec::new());
    };

    let files = repositories::exam_files::list_by_exam(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exam files"))?;
    let expires =
        StdDuration::from_secs(state.settings().exam().presigned_url_expire_minutes * 60);

    let mut references = Vec::with_capacity(files.len());
    for file in files {
        let url = storage
            .presign_get(&file.storage_key, expires)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to generate download URL"))?;
        references.push(ReferenceFile { id: file.id, filename: file.filename, url });
    }
    Ok(references)
}
