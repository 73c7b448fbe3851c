use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, ExamSession};
use crate::db::types::{ExamStatus, SessionStatus, UserRole};
use crate::repositories;
use crate::schemas::session::SessionResponse;
use crate::services::documents::{self, DocumentError};
use crate::services::question_extraction::{self, ExtractionError};
use crate::services::{exam_timer, question_order};

use super::helpers;

pub(super) async fn start_session(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    if user.role != UserRole::Student {
        return Err(ApiError::Forbidden("Only students can take exams"));
    }

    let exam = helpers::fetch_exam(&state, &exam_id).await?;
    if exam.status != ExamStatus::Published {
        return Err(ApiError::BadRequest("Exam is not available".to_string()));
    }

    let now = primitive_now_utc();
    if matches!(exam.deadline, Some(deadline) if now >= deadline) {
        return Err(ApiError::BadRequest("Exam deadline has passed".to_string()));
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    repositories::sessions::lock_user_exam(&mut *tx, &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to acquire session lock"))?;

    let existing = repositories::sessions::find_active(&mut *tx, &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch session"))?;

    let session_id = match existing {
        Some(session) if !exam_timer::is_expired(session.expires_at, now) => {
            tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
            tracing::debug!(session_id = %session.id, "Resuming active session");
            session.id
        }
        expired => {
            if let Some(session) = expired {
                let submitted_at = session.expires_at.unwrap_or(now);
                repositories::sessions::submit(&mut *tx, &session.id, submitted_at, true, now)
                    .await
                    .map_err(|e| ApiError::internal(e, "Failed to auto-submit session"))?;
                metrics::counter!("sessions_auto_submitted_total", "path" => "api").increment(1);
            }

            let attempts = repositories::sessions::count_attempts(&mut *tx, &exam.id, &user.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
            if attempts >= exam.max_attempts as i64 {
                tx.commit()
                    .await
                    .map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
                return Err(ApiError::BadRequest("Maximum attempts reached".to_string()));
            }

            let session_id = Uuid::new_v4().to_string();
            let expires_at = exam_timer::compute_expiration(
                now,
                exam_timer::parse_duration_directive(&exam.prompt),
                exam.deadline,
            );
            let inserted = repositories::sessions::create(
                &mut *tx,
                repositories::sessions::CreateSession {
                    id: &session_id,
                    exam_id: &exam.id,
                    user_id: &user.id,
                    attempt_number: (attempts + 1) as i32,
                    shuffle_seed: exam.shuffle_questions.then(question_order::new_seed),
                    started_at: now,
                    expires_at,
                },
            )
            .await
            .map_err(|e| ApiError::internal(e, "Failed to create session"))?;

            if !inserted {
                return Err(ApiError::Conflict(
                    "An active session already exists for this exam".to_string(),
                ));
            }

            tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;
            tracing::info!(
                session_id = %session_id,
                exam_id = %exam.id,
                user_id = %user.id,
                attempt = attempts + 1,
                "Exam session started"
            );
            session_id
        }
    };

    let session = repositories::sessions::fetch_one_by_id(state.db(), &session_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch session"))?;
    let session = ensure_questions(&state, &exam, session).await?;

    Ok(Json(helpers::session_response(&state, &exam, session).await?))
}

/// Extracts the question set on first use. The stored set wins any race, so
/// every caller ends up with the same questions.
async fn ensure_questions(
    state: &AppState,
    exam: &Exam,
    session: ExamSession,
) -> Result<ExamSession, ApiError> {
    if session.questions.is_some() || session.status != SessionStatus::Active {
        return Ok(session);
    }

    let files = repositories::exam_files::list_by_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exam files"))?;
    let documents = documents::load_exam_documents(
        state.storage(),
        &files,
        state.settings().max_document_bytes(),
    )
    .await
    .map_err(map_document_error)?;

    let extracted = question_extraction::extract_questions(
        state.ai(),
        exam,
        &documents,
        state.settings().exam().default_question_count,
    )
    .await
    .map_err(|err| map_extraction_error(&session.id, err))?;

    let model = extracted.model;
    let questions = match session.shuffle_seed {
        Some(seed) => question_order::shuffle_grouped(extracted.questions, seed),
        None => extracted.questions,
    };

    // The clock starts once the student can see the questions.
    let started_at = primitive_now_utc();
    let expires_at = exam_timer::compute_expiration(
        started_at,
        exam_timer::parse_duration_directive(&exam.prompt),
        exam.deadline,
    );

    let stored = repositories::sessions::set_questions(
        state.db(),
        &session.id,
        &questions,
        extracted.kind,
        started_at,
        expires_at,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store questions"))?;

    if stored {
        tracing::info!(
            session_id = %session.id,
            questions = questions.len(),
            model = %model,
            "Question set stored"
        );
    } else {
        tracing::debug!(session_id = %session.id, "Question set already stored by another request");
    }

    repositories::sessions::fetch_one_by_id(state.db(), &session.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch session"))
}

fn map_document_error(error: DocumentError) -> ApiError {
    match error {
        DocumentError::StorageUnavailable => {
            ApiError::ServiceUnavailable("S3 storage is not configured".to_string())
        }
        DocumentError::TooLarge { .. } => ApiError::BadRequest(error.to_string()),
        DocumentError::Fetch { .. } => ApiError::internal(error, "Failed to load exam documents"),
    }
}

fn map_extraction_error(session_id: &str, error: ExtractionError) -> ApiError {
    tracing::warn!(session_id, error = %error, "Question extraction failed");
    match error {
        ExtractionError::Ai(_) => {
            ApiError::BadGateway("AI service failed to generate questions, try again".to_string())
        }
        ExtractionError::NoJson | ExtractionError::NoQuestions => ApiError::BadGateway(
            "AI response did not contain usable questions, try again".to_string(),
        ),
    }
}
