use crate::api::errors::ApiError;
use crate::schemas::user::is_valid_username;
use std::path::Path;

pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    if is_valid_username(username) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Invalid username format".to_string()))
    }
}

/// Checks the extension against the allow-list and that the declared MIME
/// type agrees with it. Returns the lower-cased extension.
pub(crate) fn validate_document_upload(
    filename: &str,
    content_type: &str,
    allowed_extensions: &[String],
) -> Result<String, ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")));
    }

    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if mime_allowed_for_extension(&mime, &extension) {
        Ok(extension)
    } else {
        Err(ApiError::BadRequest(format!(
            "MIME type '{mime}' does not match extension '.{extension}'"
        )))
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "pdf" => mime == "application/pdf",
        "docx" => matches!(
            mime,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                | "application/octet-stream"
        ),
        "txt" => mime == "text/plain",
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        "webp" => mime == "image/webp",
        _ => false,
    }
}

/// Keeps storage keys free of path separators and odd characters.
pub(crate) fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename).file_name().and_then(|name| name.to_str()).unwrap_or("file");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
