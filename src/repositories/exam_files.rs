use sqlx::PgPool;

use crate::db::models::ExamFile;

const COLUMNS: &str =
    "id, exam_id, filename, storage_key, mime_type, file_size, sha256, uploaded_at";

pub(crate) async fn list_by_exam(pool: &PgPool, exam_id: &str) -> Result<Vec<ExamFile>, sqlx::Error> {
    sqlx::query_as::<_, ExamFile>(&format!(
        "SELECT {COLUMNS} FROM exam_files WHERE exam_id = $1 ORDER BY uploaded_at, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find(
    pool: &PgPool,
    exam_id: &str,
    file_id: &str,
) -> Result<Option<ExamFile>, sqlx::Error> {
    sqlx::query_as::<_, ExamFile>(&format!(
        "SELECT {COLUMNS} FROM exam_files WHERE exam_id = $1 AND id = $2"
    ))
    .bind(exam_id)
    .bind(file_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn count_by_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_files WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn create(pool: &PgPool, file: &ExamFile) -> Result<ExamFile, sqlx::Error> {
    sqlx::query_as::<_, ExamFile>(&format!(
        "INSERT INTO exam_files (
            id, exam_id, filename, storage_key, mime_type, file_size, sha256, uploaded_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        RETURNING {COLUMNS}",
    ))
    .bind(&file.id)
    .bind(&file.exam_id)
    .bind(&file.filename)
    .bind(&file.storage_key)
    .bind(&file.mime_type)
    .bind(file.file_size)
    .bind(&file.sha256)
    .bind(file.uploaded_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn delete(pool: &PgPool, exam_id: &str, file_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exam_files WHERE exam_id = $1 AND id = $2")
        .bind(exam_id)
        .bind(file_id)
        .execute(pool)
        .await?;
    Ok(())
}
