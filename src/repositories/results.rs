use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{ExamResult, ResultItem};

const COLUMNS: &str = "\
    id, session_id, exam_id, user_id, score, stated_total, computed_total, items, \
    feedback, model, created_at, updated_at";

/// Result listing row without the per-question items.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ResultSummaryRow {
    pub(crate) id: String,
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_name: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) score: f64,
    pub(crate) auto_submitted: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

const SUMMARY_SELECT: &str = "\
    SELECT r.id, r.session_id, r.exam_id, e.name AS exam_name, r.user_id, \
           u.username, u.full_name, r.score, s.auto_submitted, r.created_at \
    FROM exam_results r \
    JOIN exams e ON e.id = r.exam_id \
    JOIN users u ON u.id = r.user_id \
    JOIN exam_sessions s ON s.id = r.session_id";

pub(crate) struct SaveResult<'a> {
    pub(crate) id: &'a str,
    pub(crate) session_id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) score: f64,
    pub(crate) stated_total: Option<f64>,
    pub(crate) computed_total: f64,
    pub(crate) items: &'a [ResultItem],
    pub(crate) feedback: &'a str,
    pub(crate) model: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

/// Inserts the result, or replaces the one already stored for the session.
pub(crate) async fn save(
    executor: impl sqlx::PgExecutor<'_>,
    params: SaveResult<'_>,
) -> Result<ExamResult, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "INSERT INTO exam_results (
            id, session_id, exam_id, user_id, score, stated_total, computed_total,
            items, feedback, model, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$11)
        ON CONFLICT (session_id) DO UPDATE SET
            score = EXCLUDED.score,
            stated_total = EXCLUDED.stated_total,
            computed_total = EXCLUDED.computed_total,
            items = EXCLUDED.items,
            feedback = EXCLUDED.feedback,
            model = EXCLUDED.model,
            updated_at = EXCLUDED.updated_at
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.session_id)
    .bind(params.exam_id)
    .bind(params.user_id)
    .bind(params.score)
    .bind(params.stated_total)
    .bind(params.computed_total)
    .bind(Json(params.items))
    .bind(params.feedback)
    .bind(params.model)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_session(
    pool: &PgPool,
    session_id: &str,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {COLUMNS} FROM exam_results WHERE session_id = $1"
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_user(
    pool: &PgPool,
    user_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<ResultSummaryRow>, sqlx::Error> {
    sqlx::query_as::<_, ResultSummaryRow>(&format!(
        "{SUMMARY_SELECT} WHERE r.user_id = $1 ORDER BY r.created_at DESC OFFSET $2 LIMIT $3"
    ))
    .bind(user_id)
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_user(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_results WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<ResultSummaryRow>, sqlx::Error> {
    sqlx::query_as::<_, ResultSummaryRow>(&format!(
        "{SUMMARY_SELECT} WHERE r.exam_id = $1 ORDER BY r.score DESC, r.created_at OFFSET $2 LIMIT $3"
    ))
    .bind(exam_id)
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_results WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}
