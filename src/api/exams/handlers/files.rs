use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::api::validation::{sanitize_filename, validate_document_upload};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::ExamFile;
use crate::repositories;
use crate::schemas::exam::ExamFileResponse;

use super::super::helpers;

pub(in crate::api::exams) async fn upload_file(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ExamFileResponse>), ApiError> {
    let exam = helpers::fetch_owned_exam(&state, &teacher, &exam_id).await?;

    let storage = state.storage().ok_or_else(|| {
        ApiError::ServiceUnavailable("S3 storage is not configured".to_string())
    })?;

    let current_files = repositories::exam_files::count_by_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exam files"))?;
    let max_files = state.settings().storage().max_files_per_exam as i64;
    if current_files >= max_files {
        return Err(ApiError::BadRequest(format!(
            "Maximum number of files per exam exceeded ({max_files})"
        )));
    }

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let max_bytes = state.settings().max_document_bytes();
    let max_mb = state.settings().storage().max_document_size_mb;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        filename = field.file_name().map(|s| s.to_string());
        content_type = field.content_type().map(|s| s.to_string());
        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
        {
            if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(ApiError::BadRequest(format!("File size exceeds {max_mb}MB limit")));
            }
            bytes.extend_from_slice(&chunk);
        }
        file_bytes = Some(bytes);
    }

    let file_bytes =
        file_bytes.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;
    if file_bytes.is_empty() {
        return Err(ApiError::BadRequest("File is empty".to_string()));
    }
    let filename =
        filename.ok_or_else(|| ApiError::BadRequest("File name is required".to_string()))?;
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    validate_document_upload(
        &filename,
        &content_type,
        &state.settings().storage().allowed_document_extensions,
    )?;

    let file_id = Uuid::new_v4().to_string();
    let key = format!("exams/{}/{}_{}", exam.id, file_id, sanitize_filename(&filename));
    let mime_type = content_type.split(';').next().unwrap_or_default().trim().to_string();

    let stored = storage
        .upload_bytes(&key, &mime_type, file_bytes)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to upload file to S3"))?;

    let file = repositories::exam_files::create(
        state.db(),
        &ExamFile {
            id: file_id,
            exam_id: exam.id.clone(),
            filename,
            storage_key: key,
            mime_type,
            file_size: stored.size,
            sha256: stored.sha256,
            uploaded_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store file metadata"))?;

    tracing::info!(
        user_id = %teacher.id,
        exam_id = %exam.id,
        file_id = %file.id,
        size = file.file_size,
        action = "exam_file_upload",
        "Exam file uploaded"
    );

    Ok((StatusCode::CREATED, Json(ExamFileResponse::from_db(file))))
}

pub(in crate::api::exams) async fn delete_file(
    Path((exam_id, file_id)): Path<(String, String)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let exam = helpers::fetch_owned_exam(&state, &teacher, &exam_id).await?;

    let file = repositories::exam_files::find(state.db(), &exam.id, &file_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam file"))?
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    repositories::exam_files::delete(state.db(), &exam.id, &file.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete file metadata"))?;

    if let Some(storage) = state.storage() {
        if let Err(err) = storage.delete_object(&file.storage_key).await {
            tracing::warn!(
                exam_id = %exam.id,
                key = %file.storage_key,
                error = %err,
                "Failed to delete exam file from storage"
            );
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
