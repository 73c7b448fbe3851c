use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{AnswerMap, ExamSession, Question};
use crate::db::types::{QuestionKind, SessionStatus};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, user_id, status, attempt_number, shuffle_seed, questions, question_kind, \
    answers, current_index, started_at, expires_at, submitted_at, auto_submitted, \
    last_saved_at, grading_started_at, grading_attempts, grading_error, created_at, updated_at";

pub(crate) struct CreateSession<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) shuffle_seed: Option<i64>,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: Option<PrimitiveDateTime>,
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!("SELECT {COLUMNS} FROM exam_sessions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn fetch_one_by_id(pool: &PgPool, id: &str) -> Result<ExamSession, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!("SELECT {COLUMNS} FROM exam_sessions WHERE id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn find_active(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    user_id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "SELECT {COLUMNS} FROM exam_sessions \
         WHERE exam_id = $1 AND user_id = $2 AND status = $3"
    ))
    .bind(exam_id)
    .bind(user_id)
    .bind(SessionStatus::Active)
    .fetch_optional(executor)
    .await
}

/// Serialises session starts for one user and exam until the transaction ends.
pub(crate) async fn lock_user_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    user_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("exam_session:{exam_id}:{user_id}"))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn count_attempts(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    user_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_sessions WHERE exam_id = $1 AND user_id = $2")
        .bind(exam_id)
        .bind(user_id)
        .fetch_one(executor)
        .await
}

/// Returns `false` when another active session for the pair already exists.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    session: CreateSession<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_sessions (
            id, exam_id, user_id, status, attempt_number, shuffle_seed,
            started_at, expires_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$7,$7)
        ON CONFLICT DO NOTHING",
    )
    .bind(session.id)
    .bind(session.exam_id)
    .bind(session.user_id)
    .bind(SessionStatus::Active)
    .bind(session.attempt_number)
    .bind(session.shuffle_seed)
    .bind(session.started_at)
    .bind(session.expires_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Stores the question set once and starts the timer from that moment; a
/// second writer gets `false` and must re-read.
pub(crate) async fn set_questions(
    pool: &PgPool,
    id: &str,
    questions: &[Question],
    kind: QuestionKind,
    started_at: PrimitiveDateTime,
    expires_at: Option<PrimitiveDateTime>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_sessions
         SET questions = $1, question_kind = $2, started_at = $3, expires_at = $4, updated_at = $3
         WHERE id = $5 AND questions IS NULL",
    )
    .bind(Json(questions))
    .bind(kind)
    .bind(started_at)
    .bind(expires_at)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn save_progress(
    pool: &PgPool,
    id: &str,
    answers: &AnswerMap,
    current_index: i32,
    now: PrimitiveDateTime,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "UPDATE exam_sessions
         SET answers = $1, current_index = $2, last_saved_at = $3, updated_at = $3
         WHERE id = $4 AND status = $5
         RETURNING {COLUMNS}",
    ))
    .bind(Json(answers))
    .bind(current_index)
    .bind(now)
    .bind(id)
    .bind(SessionStatus::Active)
    .fetch_optional(pool)
    .await
}

/// Moves an active session to `submitted`; `None` when it was no longer active.
pub(crate) async fn submit(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    submitted_at: PrimitiveDateTime,
    auto_submitted: bool,
    now: PrimitiveDateTime,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "UPDATE exam_sessions
         SET status = $1, submitted_at = $2, auto_submitted = $3, updated_at = $4
         WHERE id = $5 AND status = $6
         RETURNING {COLUMNS}",
    ))
    .bind(SessionStatus::Submitted)
    .bind(submitted_at)
    .bind(auto_submitted)
    .bind(now)
    .bind(id)
    .bind(SessionStatus::Active)
    .fetch_optional(executor)
    .await
}

/// Submits every active session that expired before `expired_before`,
/// stamped at its expiry.
pub(crate) async fn auto_submit_expired(
    pool: &PgPool,
    expired_before: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE exam_sessions
         SET status = $1, submitted_at = expires_at, auto_submitted = TRUE, updated_at = $2
         WHERE status = $3 AND expires_at IS NOT NULL AND expires_at < $4
         RETURNING id",
    )
    .bind(SessionStatus::Submitted)
    .bind(now)
    .bind(SessionStatus::Active)
    .bind(expired_before)
    .fetch_all(pool)
    .await
}

/// A session taken off the grading queue. `claimed_at` is the stored
/// `grading_started_at` and identifies this particular claim.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct GradingClaim {
    pub(crate) session_id: String,
    pub(crate) claimed_at: PrimitiveDateTime,
}

pub(crate) async fn claim_next_for_grading(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Option<GradingClaim>, sqlx::Error> {
    sqlx::query_as::<_, GradingClaim>(
        "WITH candidate AS (
            SELECT id FROM exam_sessions
            WHERE status = $1
            ORDER BY grading_attempts, submitted_at NULLS LAST, created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE exam_sessions
        SET status = $2,
            grading_started_at = $3,
            updated_at = $3
        FROM candidate
        WHERE exam_sessions.id = candidate.id
        RETURNING exam_sessions.id AS session_id,
                  exam_sessions.grading_started_at AS claimed_at",
    )
    .bind(SessionStatus::Submitted)
    .bind(SessionStatus::Grading)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Marks a claimed session graded. `false` when the claim was lost to a
/// requeue or another worker.
pub(crate) async fn mark_graded(
    executor: impl sqlx::PgExecutor<'_>,
    claim: &GradingClaim,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_sessions
         SET status = $1, grading_error = NULL, updated_at = $2
         WHERE id = $3 AND status = $4 AND grading_started_at = $5",
    )
    .bind(SessionStatus::Graded)
    .bind(now)
    .bind(&claim.session_id)
    .bind(SessionStatus::Grading)
    .bind(claim.claimed_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Records a failed grading attempt. The session goes back to `submitted`
/// until `max_attempts` failures, then to `failed`.
pub(crate) async fn record_grading_failure(
    pool: &PgPool,
    claim: &GradingClaim,
    error: &str,
    max_attempts: i32,
    now: PrimitiveDateTime,
) -> Result<Option<SessionStatus>, sqlx::Error> {
    sqlx::query_scalar::<_, SessionStatus>(
        "UPDATE exam_sessions
         SET status = CASE WHEN grading_attempts + 1 >= $1 THEN $2 ELSE $3 END,
             grading_attempts = grading_attempts + 1,
             grading_error = $4,
             grading_started_at = NULL,
             updated_at = $5
         WHERE id = $6 AND status = $7 AND grading_started_at = $8
         RETURNING status",
    )
    .bind(max_attempts)
    .bind(SessionStatus::Failed)
    .bind(SessionStatus::Submitted)
    .bind(error)
    .bind(now)
    .bind(&claim.session_id)
    .bind(SessionStatus::Grading)
    .bind(claim.claimed_at)
    .fetch_optional(pool)
    .await
}

/// Requeues sessions whose grading started before `cutoff` and never finished.
pub(crate) async fn requeue_stale_grading(
    pool: &PgPool,
    cutoff: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_sessions
         SET status = $1, grading_started_at = NULL, updated_at = $2
         WHERE status = $3 AND (grading_started_at IS NULL OR grading_started_at < $4)",
    )
    .bind(SessionStatus::Submitted)
    .bind(now)
    .bind(SessionStatus::Grading)
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
