use crate::api::errors::ApiError;
use crate::api::guards::require_exam_owner;
use crate::core::state::AppState;
use crate::db::models::{Exam, User};
use crate::db::types::ExamStatus;
use crate::repositories;
use crate::schemas::exam::ExamResponse;

pub(super) async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}

/// Loads the exam and checks that `user` may change it.
pub(super) async fn fetch_owned_exam(
    state: &AppState,
    user: &User,
    exam_id: &str,
) -> Result<Exam, ApiError> {
    let exam = fetch_exam(state, exam_id).await?;
    require_exam_owner(user, &exam)?;
    Ok(exam)
}

/// Students only see published exams; authors see everything they may manage.
pub(super) fn can_view_exam(user: &User, exam: &Exam) -> bool {
    exam.status == ExamStatus::Published || require_exam_owner(user, exam).is_ok()
}

pub(super) async fn exam_response(
    state: &AppState,
    exam: Exam,
    include_prompt: bool,
) -> Result<ExamResponse, ApiError> {
    let files = repositories::exam_files::list_by_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exam files"))?;
    Ok(ExamResponse::from_db(exam, files, include_prompt))
}
