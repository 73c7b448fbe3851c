use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::types::SessionStatus;
use crate::repositories;
use crate::schemas::session::{ProgressResponse, ProgressUpdate, SessionResponse};
use crate::services::{exam_timer, session_progress};

use super::helpers;

pub(super) async fn get_session(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = helpers::fetch_own_session(&state, &user, &session_id).await?;
    let session = helpers::enforce_expiry(&state, session).await?;
    let exam = helpers::fetch_exam(&state, &session.exam_id).await?;

    Ok(Json(helpers::session_response(&state, &exam, session).await?))
}

pub(super) async fn save_progress(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ProgressUpdate>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let session = helpers::fetch_own_session(&state, &user, &session_id).await?;
    let session = helpers::enforce_expiry(&state, session).await?;
    if session.status != SessionStatus::Active {
        return Err(ApiError::BadRequest("Session is not active".to_string()));
    }
    if exam_timer::is_expired(session.expires_at, primitive_now_utc()) {
        return Err(ApiError::BadRequest("Time is up, submit the exam".to_string()));
    }

    let interval = state.settings().exam().auto_save_interval_seconds;
    let rate_key = format!("autosave:{}", session.id);
    if !state.redis().allow(&rate_key, 1, interval).await {
        return Err(ApiError::TooManyRequests("Progress saved too often, slow down"));
    }

    let questions = session.question_list();
    let current_index = payload.current_index.unwrap_or(session.current_index);
    session_progress::validate_index(current_index, questions.len())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let answers = session_progress::merge_answers(questions, &session.answers.0, &payload.answers)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let now = primitive_now_utc();
    let saved =
        repositories::sessions::save_progress(state.db(), &session.id, &answers, current_index, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to save progress"))?
            .ok_or_else(|| ApiError::BadRequest("Session is not active".to_string()))?;

    tracing::debug!(
        session_id = %saved.id,
        answered = saved.answers.0.len(),
        current_index,
        "Progress saved"
    );

    Ok(Json(ProgressResponse {
        session_id: saved.id,
        current_index: saved.current_index,
        answered: saved.answers.0.len(),
        saved_at: format_primitive(saved.last_saved_at.unwrap_or(now)),
        time_remaining_seconds: exam_timer::remaining_seconds(saved.expires_at, now),
    }))
}
