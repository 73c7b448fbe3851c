use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

use crate::api::pagination::default_limit;
pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{Exam, ExamFile};
use crate::db::types::ExamStatus;
use crate::services::exam_timer;

pub(crate) const MAX_QUESTION_COUNT: i32 = 200;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, max = 255, message = "name must be 1..255 characters"))]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) prompt: String,
    #[serde(default, deserialize_with = "deserialize_option_offset_datetime_flexible")]
    pub(crate) deadline: Option<OffsetDateTime>,
    #[serde(default, alias = "allowReferences")]
    pub(crate) allow_references: bool,
    #[serde(default, alias = "shuffleQuestions")]
    pub(crate) shuffle_questions: bool,
    #[serde(default, alias = "questionCount")]
    #[validate(range(min = 1, max = 200, message = "question_count must be in range 1..200"))]
    pub(crate) question_count: Option<i32>,
    #[serde(default, alias = "aiModel")]
    #[validate(length(max = 128, message = "ai_model must be at most 128 characters"))]
    pub(crate) ai_model: Option<String>,
    #[serde(default = "default_max_attempts", alias = "maxAttempts")]
    #[validate(range(min = 1, max = 100, message = "max_attempts must be in range 1..100"))]
    pub(crate) max_attempts: i32,
}

/// Partial update. For nullable fields an explicit `null` clears the value
/// and an absent field leaves it unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "name must be 1..255 characters"))]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) prompt: Option<String>,
    #[serde(default, deserialize_with = "deserialize_patch_datetime")]
    pub(crate) deadline: Option<Option<OffsetDateTime>>,
    #[serde(default, alias = "allowReferences")]
    pub(crate) allow_references: Option<bool>,
    #[serde(default, alias = "shuffleQuestions")]
    pub(crate) shuffle_questions: Option<bool>,
    #[serde(default, alias = "questionCount", deserialize_with = "deserialize_patch")]
    pub(crate) question_count: Option<Option<i32>>,
    #[serde(default, alias = "aiModel", deserialize_with = "deserialize_patch")]
    pub(crate) ai_model: Option<Option<String>>,
    #[serde(default, alias = "maxAttempts")]
    #[validate(range(min = 1, max = 100, message = "max_attempts must be in range 1..100"))]
    pub(crate) max_attempts: Option<i32>,
}

impl ExamUpdate {
    /// Checks the nullable fields `validator` cannot see through.
    pub(crate) fn validate_patch(&self) -> Result<(), String> {
        if let Some(Some(count)) = self.question_count {
            if !(1..=MAX_QUESTION_COUNT).contains(&count) {
                return Err("question_count must be in range 1..200".to_string());
            }
        }
        if let Some(Some(model)) = &self.ai_model {
            if model.len() > 128 {
                return Err("ai_model must be at most 128 characters".to_string());
            }
        }
        Ok(())
    }

    pub(crate) fn apply(self, exam: &mut Exam) {
        if let Some(name) = self.name {
            exam.name = name;
        }
        if let Some(prompt) = self.prompt {
            exam.prompt = prompt;
        }
        if let Some(deadline) = self.deadline {
            exam.deadline = deadline.map(crate::core::time::to_primitive_utc);
        }
        if let Some(allow_references) = self.allow_references {
            exam.allow_references = allow_references;
        }
        if let Some(shuffle_questions) = self.shuffle_questions {
            exam.shuffle_questions = shuffle_questions;
        }
        if let Some(question_count) = self.question_count {
            exam.question_count = question_count;
        }
        if let Some(ai_model) = self.ai_model {
            exam.ai_model = normalize_model(ai_model);
        }
        if let Some(max_attempts) = self.max_attempts {
            exam.max_attempts = max_attempts;
        }
    }
}

pub(crate) fn normalize_model(model: Option<String>) -> Option<String> {
    model.map(|model| model.trim().to_string()).filter(|model| !model.is_empty())
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamListQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
    #[serde(default)]
    pub(crate) status: Option<ExamStatus>,
    #[serde(default)]
    pub(crate) search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExamDeleteQuery {
    #[serde(default)]
    pub(crate) force_delete: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamFileResponse {
    pub(crate) id: String,
    pub(crate) filename: String,
    pub(crate) mime_type: String,
    pub(crate) file_size: i64,
    pub(crate) sha256: String,
    pub(crate) uploaded_at: String,
}

impl ExamFileResponse {
    pub(crate) fn from_db(file: ExamFile) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            mime_type: file.mime_type,
            file_size: file.file_size,
            sha256: file.sha256,
            uploaded_at: format_primitive(file.uploaded_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    /// Grading instructions; hidden from students.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) prompt: Option<String>,
    pub(crate) deadline: Option<String>,
    pub(crate) duration_minutes: Option<i64>,
    pub(crate) allow_references: bool,
    pub(crate) shuffle_questions: bool,
    pub(crate) question_count: Option<i32>,
    pub(crate) ai_model: Option<String>,
    pub(crate) max_attempts: i32,
    pub(crate) status: ExamStatus,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) published_at: Option<String>,
    pub(crate) files: Vec<ExamFileResponse>,
}

impl ExamResponse {
    pub(crate) fn from_db(exam: Exam, files: Vec<ExamFile>, include_prompt: bool) -> Self {
        let duration_minutes =
            exam_timer::parse_duration_directive(&exam.prompt).map(|d| d.whole_minutes());
        Self {
            id: exam.id,
            name: exam.name,
            prompt: include_prompt.then_some(exam.prompt),
            deadline: exam.deadline.map(format_primitive),
            duration_minutes,
            allow_references: exam.allow_references,
            shuffle_questions: exam.shuffle_questions,
            question_count: exam.question_count,
            ai_model: exam.ai_model,
            max_attempts: exam.max_attempts,
            status: exam.status,
            created_by: exam.created_by,
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            published_at: exam.published_at.map(format_primitive),
            files: files.into_iter().map(ExamFileResponse::from_db).collect(),
        }
    }
}

fn default_max_attempts() -> i32 {
    1
}

pub(crate) fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // `datetime-local` inputs arrive without an offset; read them as UTC.
    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_offset_datetime_flexible(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}

fn deserialize_patch_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<Option<OffsetDateTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_option_offset_datetime_flexible(deserializer).map(Some)
}

fn deserialize_patch<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
