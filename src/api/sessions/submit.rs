use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::{require_exam_owner, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::SessionStatus;
use crate::repositories;
use crate::schemas::result::{PendingResult, ResultResponse, SessionResultResponse};
use crate::schemas::session::{ProgressUpdate, SubmitResponse};
use crate::services::{exam_timer, session_progress};

use super::helpers;

/// Final answers may ride along with the submit; they are merged like a
/// progress save but skip the autosave rate limit.
pub(super) async fn submit_session(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    payload: Option<Json<ProgressUpdate>>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let session = helpers::fetch_own_session(&state, &user, &session_id).await?;
    if session.status != SessionStatus::Active {
        return Ok(Json(SubmitResponse::from_db(&session)));
    }

    let now = primitive_now_utc();
    let grace = state.settings().exam().submit_grace_seconds;
    if !exam_timer::within_submit_grace(session.expires_at, now, grace) {
        let session = helpers::enforce_expiry(&state, session).await?;
        return Ok(Json(SubmitResponse::from_db(&session)));
    }

    if let Some(Json(update)) = payload {
        let questions = session.question_list();
        let current_index = update.current_index.unwrap_or(session.current_index);
        session_progress::validate_index(current_index, questions.len())
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let answers =
            session_progress::merge_answers(questions, &session.answers.0, &update.answers)
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        repositories::sessions::save_progress(
            state.db(),
            &session.id,
            &answers,
            current_index,
            now,
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to save final answers"))?;
    }

    let submitted = repositories::sessions::submit(state.db(), &session.id, now, false, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to submit session"))?;

    let session = match submitted {
        Some(session) => {
            tracing::info!(
                session_id = %session.id,
                exam_id = %session.exam_id,
                user_id = %session.user_id,
                answered = session.answers.0.len(),
                "Exam session submitted"
            );
            session
        }
        None => repositories::sessions::fetch_one_by_id(state.db(), &session.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch session"))?,
    };

    Ok(Json(SubmitResponse::from_db(&session)))
}

pub(super) async fn get_session_result(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResultResponse>, ApiError> {
    let session = repositories::sessions::find_by_id(state.db(), &session_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch session"))?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    if session.user_id != user.id {
        let exam = helpers::fetch_exam(&state, &session.exam_id).await?;
        require_exam_owner(&user, &exam).map_err(|_| ApiError::Forbidden("Access denied"))?;
    }

    let session = helpers::enforce_expiry(&state, session).await?;

    let result = repositories::results::find_by_session(state.db(), &session.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch result"))?;

    let response = match result {
        Some(result) => SessionResultResponse::Ready(Box::new(ResultResponse::from_db(result))),
        None => SessionResultResponse::Pending(PendingResult {
            session_id: session.id,
            status: session.status,
            detail: session.grading_error,
        }),
    };

    Ok(Json(response))
}
