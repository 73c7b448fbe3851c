use axum::{extract::State, http::StatusCode, Json};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::repositories;
use crate::schemas::exam::{normalize_model, ExamCreate, ExamResponse};

use super::super::helpers;

pub(in crate::api::exams) async fn create_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be blank".to_string()));
    }

    let ai_model = normalize_model(payload.ai_model);
    let exam = repositories::exams::create(
        state.db(),
        repositories::exams::CreateExam {
            id: &Uuid::new_v4().to_string(),
            name,
            prompt: &payload.prompt,
            deadline: payload.deadline.map(to_primitive_utc),
            allow_references: payload.allow_references,
            shuffle_questions: payload.shuffle_questions,
            question_count: payload.question_count,
            ai_model: ai_model.as_deref(),
            max_attempts: payload.max_attempts,
            created_by: &teacher.id,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %exam.id,
        action = "exam_create",
        "Exam created"
    );

    let response = helpers::exam_response(&state, exam, true).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
