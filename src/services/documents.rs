use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use thiserror::Error;

use crate::db::models::ExamFile;
use crate::services::storage::StorageService;

/// An exam attachment ready to be sent inline to the AI model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentPayload {
    pub(crate) filename: String,
    pub(crate) mime_type: String,
    pub(crate) data_base64: String,
}

#[derive(Debug, Error)]
pub(crate) enum DocumentError {
    #[error("document storage is not configured")]
    StorageUnavailable,
    #[error("document '{filename}' is {size} bytes, above the {limit} byte limit")]
    TooLarge { filename: String, size: i64, limit: u64 },
    #[error("failed to load document '{filename}': {reason}")]
    Fetch { filename: String, reason: String },
}

impl DocumentPayload {
    pub(crate) fn from_bytes(filename: &str, mime_type: &str, bytes: &[u8]) -> Self {
        let mime_type = if mime_type.trim().is_empty() || mime_type == "application/octet-stream" {
            mime_from_filename(filename).unwrap_or("application/octet-stream")
        } else {
            mime_type.trim()
        };

        Self {
            filename: filename.to_string(),
            mime_type: mime_type.to_ascii_lowercase(),
            data_base64: STANDARD.encode(bytes),
        }
    }

    pub(crate) fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }

    /// Chat-completions content part: images inline as `image_url`, everything else as `file`.
    pub(crate) fn to_content_part(&self) -> Value {
        if self.is_image() {
            json!({"type": "image_url", "image_url": {"url": self.data_url()}})
        } else {
            json!({
                "type": "file",
                "file": {"filename": self.filename, "file_data": self.data_url()}
            })
        }
    }
}

pub(crate) fn mime_from_filename(filename: &str) -> Option<&'static str> {
    let extension = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(mime)
}

/// Fetches every attachment of an exam, in upload order.
pub(crate) async fn load_exam_documents(
    storage: Option<&StorageService>,
    files: &[ExamFile],
    max_bytes: u64,
) -> Result<Vec<DocumentPayload>, DocumentError> {
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let storage = storage.ok_or(DocumentError::StorageUnavailable)?;
    let mut documents = Vec::with_capacity(files.len());

    for file in files {
        if file.file_size as u64 > max_bytes {
            return Err(DocumentError::TooLarge {
                filename: file.filename.clone(),
                size: file.file_size,
                limit: max_bytes,
            });
        }

        let bytes = storage.download_bytes(&file.storage_key, max_bytes).await.map_err(|err| {
            DocumentError::Fetch { filename: file.filename.clone(), reason: format!("{err:#}") }
        })?;

        tracing::debug!(
            exam_id = %file.exam_id,
            file_id = %file.id,
            size = bytes.len(),
            "Loaded exam document"
        );
        documents.push(DocumentPayload::from_bytes(&file.filename, &file.mime_type, &bytes));
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;

    fn exam_file(size: i64) -> ExamFile {
        ExamFile {
            id: "file-1".to_string(),
            exam_id: "exam-1".to_string(),
            filename: "de-thi.pdf".to_string(),
            storage_key: "exams/exam-1/file-1_de-thi.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            file_size: size,
            sha256: String::new(),
            uploaded_at: primitive_now_utc(),
        }
    }

    #[test]
    fn pdf_becomes_file_part() {
        let payload = DocumentPayload::from_bytes("de-thi.pdf", "application/pdf", b"%PDF-");
        let part = payload.to_content_part();
        assert_eq!(part["type"], "file");
        assert_eq!(part["file"]["filename"], "de-thi.pdf");
        assert_eq!(part["file"]["file_data"], "data:application/pdf;base64,JVBERi0=");
    }

    #[test]
    fn image_becomes_image_url_part() {
        let payload = DocumentPayload::from_bytes("scan.PNG", "", &[0x89, 0x50]);
        assert_eq!(payload.mime_type, "image/png");
        let part = payload.to_content_part();
        assert_eq!(part["type"], "image_url");
        assert!(part["image_url"]["url"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn octet_stream_falls_back_to_extension() {
        let payload = DocumentPayload::from_bytes("notes.txt", "application/octet-stream", b"hi");
        assert_eq!(payload.mime_type, "text/plain");
        let unknown = DocumentPayload::from_bytes("blob.bin", "", b"hi");
        assert_eq!(unknown.mime_type, "application/octet-stream");
    }

    #[test]
    fn mime_lookup_is_case_insensitive() {
        assert_eq!(mime_from_filename("A.JPEG"), Some("image/jpeg"));
        assert_eq!(mime_from_filename("noext"), None);
    }

    #[tokio::test]
    async fn no_files_needs_no_storage() {
        let documents = load_exam_documents(None, &[], 1024).await.expect("empty");
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn files_without_storage_fail() {
        let err = load_exam_documents(None, &[exam_file(10)], 1024).await.unwrap_err();
        assert!(matches!(err, DocumentError::StorageUnavailable));
    }
}
