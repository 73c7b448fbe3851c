use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentTeacher, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::ExamStatus;
use crate::repositories;
use crate::schemas::exam::{ExamDeleteQuery, ExamResponse, ExamUpdate};

use super::super::helpers;

pub(in crate::api::exams) async fn get_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = helpers::fetch_exam(&state, &exam_id).await?;

    if !helpers::can_view_exam(&user, &exam) {
        // Unpublished exams stay invisible to students.
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }

    let include_prompt = user.role.can_author_exams();
    Ok(Json(helpers::exam_response(&state, exam, include_prompt).await?))
}

pub(in crate::api::exams) async fn update_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    let mut exam = helpers::fetch_owned_exam(&state, &teacher, &exam_id).await?;

    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    payload.validate_patch().map_err(ApiError::BadRequest)?;
    if matches!(&payload.name, Some(name) if name.trim().is_empty()) {
        return Err(ApiError::BadRequest("name must not be blank".to_string()));
    }

    payload.apply(&mut exam);
    exam.name = exam.name.trim().to_string();
    exam.updated_at = primitive_now_utc();

    let updated = repositories::exams::update(state.db(), &exam)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %updated.id,
        action = "exam_update",
        "Exam updated"
    );

    Ok(Json(helpers::exam_response(&state, updated, true).await?))
}

pub(in crate::api::exams) async fn delete_exam(
    Path(exam_id): Path<String>,
    Query(params): Query<ExamDeleteQuery>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let exam = helpers::fetch_owned_exam(&state, &teacher, &exam_id).await?;

    let sessions_count = repositories::exams::count_sessions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count sessions"))?;

    if sessions_count > 0 && !params.force_delete {
        return Err(ApiError::BadRequest(format!(
            "Cannot delete exam with {sessions_count} existing session(s). Use force_delete=true to delete anyway."
        )));
    }

    let files = repositories::exam_files::list_by_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exam files"))?;

    repositories::exams::delete_by_id(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;

    if let Some(storage) = state.storage() {
        for file in &files {
            if let Err(err) = storage.delete_object(&file.storage_key).await {
                tracing::warn!(
                    exam_id = %exam.id,
                    key = %file.storage_key,
                    error = %err,
                    "Failed to delete exam file from storage"
                );
            }
        }
    }

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %exam.id,
        sessions = sessions_count,
        action = "exam_delete",
        "Exam deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

pub(in crate::api::exams) async fn publish_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = helpers::fetch_owned_exam(&state, &teacher, &exam_id).await?;

    if exam.status == ExamStatus::Published {
        return Err(ApiError::BadRequest("Exam is already published".to_string()));
    }

    if exam.prompt.trim().is_empty() {
        let files = repositories::exam_files::count_by_exam(state.db(), &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count exam files"))?;
        if files == 0 {
            return Err(ApiError::BadRequest(
                "Exam needs a prompt or at least one attached file".to_string(),
            ));
        }
    }

    let updated = repositories::exams::set_status(
        state.db(),
        &exam.id,
        ExamStatus::Published,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to publish exam"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %updated.id,
        action = "exam_publish",
        "Exam published"
    );

    Ok(Json(helpers::exam_response(&state, updated, true).await?))
}

pub(in crate::api::exams) async fn archive_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = helpers::fetch_owned_exam(&state, &teacher, &exam_id).await?;

    if exam.status == ExamStatus::Archived {
        return Err(ApiError::BadRequest("Exam is already archived".to_string()));
    }

    let updated = repositories::exams::set_status(
        state.db(),
        &exam.id,
        ExamStatus::Archived,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to archive exam"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %updated.id,
        action = "exam_archive",
        "Exam archived"
    );

    Ok(Json(helpers::exam_response(&state, updated, true).await?))
}
