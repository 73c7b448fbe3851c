use sqlx::PgPool;
use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Exam;
use crate::db::types::ExamStatus;

pub(crate) const COLUMNS: &str = "\
    id, name, prompt, deadline, allow_references, shuffle_questions, question_count, \
    ai_model, max_attempts, status, created_by, created_at, updated_at, published_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn fetch_one_by_id(pool: &PgPool, id: &str) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) name: &'a str,
    pub(crate) prompt: &'a str,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) allow_references: bool,
    pub(crate) shuffle_questions: bool,
    pub(crate) question_count: Option<i32>,
    pub(crate) ai_model: Option<&'a str>,
    pub(crate) max_attempts: i32,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(pool: &PgPool, params: CreateExam<'_>) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, name, prompt, deadline, allow_references, shuffle_questions, question_count,
            ai_model, max_attempts, status, created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$12)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.name)
    .bind(params.prompt)
    .bind(params.deadline)
    .bind(params.allow_references)
    .bind(params.shuffle_questions)
    .bind(params.question_count)
    .bind(params.ai_model)
    .bind(params.max_attempts)
    .bind(ExamStatus::Draft)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

/// Writes every editable column of `exam`.
pub(crate) async fn update(pool: &PgPool, exam: &Exam) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams SET
            name = $1,
            prompt = $2,
            deadline = $3,
            allow_references = $4,
            shuffle_questions = $5,
            question_count = $6,
            ai_model = $7,
            max_attempts = $8,
            updated_at = $9
         WHERE id = $10
         RETURNING {COLUMNS}",
    ))
    .bind(&exam.name)
    .bind(&exam.prompt)
    .bind(exam.deadline)
    .bind(exam.allow_references)
    .bind(exam.shuffle_questions)
    .bind(exam.question_count)
    .bind(exam.ai_model.as_deref())
    .bind(exam.max_attempts)
    .bind(exam.updated_at)
    .bind(&exam.id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn set_status(
    pool: &PgPool,
    id: &str,
    status: ExamStatus,
    now: PrimitiveDateTime,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams
         SET status = $1,
             published_at = COALESCE(published_at, $2),
             updated_at = $3
         WHERE id = $4
         RETURNING {COLUMNS}",
    ))
    .bind(status)
    .bind((status == ExamStatus::Published).then_some(now))
    .bind(now)
    .bind(id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn count_sessions(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_sessions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

#[derive(Debug, Default)]
pub(crate) struct ExamFilter<'a> {
    pub(crate) status: Option<ExamStatus>,
    pub(crate) created_by: Option<&'a str>,
    pub(crate) search: Option<&'a str>,
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &ExamFilter<'a>) {
    builder.push(" WHERE 1=1");
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    if let Some(created_by) = filter.created_by {
        builder.push(" AND created_by = ");
        builder.push_bind(created_by);
    }
    if let Some(search) = filter.search.filter(|search| !search.trim().is_empty()) {
        builder.push(" AND name ILIKE ");
        builder.push_bind(format!("%{}%", search.trim()));
    }
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &ExamFilter<'_>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Exam>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM exams"));
    push_filters(&mut builder, filter);
    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Exam>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, filter: &ExamFilter<'_>) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exams");
    push_filters(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}
