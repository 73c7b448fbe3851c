use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AnswerStatus, ExamStatus, QuestionKind, SessionStatus, UserRole};

/// Question id to the selected option letter or free-text answer.
pub(crate) type AnswerMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) prompt: String,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) allow_references: bool,
    pub(crate) shuffle_questions: bool,
    pub(crate) question_count: Option<i32>,
    pub(crate) ai_model: Option<String>,
    pub(crate) max_attempts: i32,
    pub(crate) status: ExamStatus,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamFile {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) filename: String,
    pub(crate) storage_key: String,
    pub(crate) mime_type: String,
    pub(crate) file_size: i64,
    pub(crate) sha256: String,
    pub(crate) uploaded_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) passage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) correct_answer: Option<String>,
    pub(crate) kind: QuestionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamSession {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) status: SessionStatus,
    pub(crate) attempt_number: i32,
    pub(crate) shuffle_seed: Option<i64>,
    pub(crate) questions: Option<Json<Vec<Question>>>,
    pub(crate) question_kind: Option<QuestionKind>,
    pub(crate) answers: Json<AnswerMap>,
    pub(crate) current_index: i32,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: Option<PrimitiveDateTime>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) auto_submitted: bool,
    pub(crate) last_saved_at: Option<PrimitiveDateTime>,
    pub(crate) grading_started_at: Option<PrimitiveDateTime>,
    pub(crate) grading_attempts: i32,
    pub(crate) grading_error: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl ExamSession {
    pub(crate) fn question_list(&self) -> &[Question] {
        self.questions.as_ref().map(|questions| questions.0.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ResultItem {
    pub(crate) question_id: String,
    pub(crate) question: String,
    pub(crate) user_answer: Option<String>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) status: AnswerStatus,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamResult {
    pub(crate) id: String,
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) score: f64,
    pub(crate) stated_total: Option<f64>,
    pub(crate) computed_total: f64,
    pub(crate) items: Json<Vec<ResultItem>>,
    pub(crate) feedback: String,
    pub(crate) model: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
