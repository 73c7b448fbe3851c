use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::{AnswerMap, ExamSession, Question};
use crate::db::types::{QuestionKind, SessionStatus};

/// A question as shown while the attempt is running: no correct answer.
#[derive(Debug, Serialize)]
pub(crate) struct SessionQuestion {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) passage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) group_id: Option<String>,
    pub(crate) kind: QuestionKind,
}

impl From<&Question> for SessionQuestion {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            options: question.options.clone(),
            passage: question.passage.clone(),
            group_id: question.group_id.clone(),
            kind: question.kind,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ReferenceFile {
    pub(crate) id: String,
    pub(crate) filename: String,
    pub(crate) url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_name: String,
    pub(crate) status: SessionStatus,
    pub(crate) attempt_number: i32,
    pub(crate) question_kind: Option<QuestionKind>,
    pub(crate) questions: Vec<SessionQuestion>,
    pub(crate) answers: AnswerMap,
    pub(crate) current_index: i32,
    pub(crate) started_at: String,
    pub(crate) expires_at: Option<String>,
    pub(crate) time_remaining_seconds: Option<i64>,
    pub(crate) submitted_at: Option<String>,
    pub(crate) auto_submitted: bool,
    pub(crate) auto_save_interval_seconds: u64,
    pub(crate) references: Vec<ReferenceFile>,
}

impl SessionResponse {
    pub(crate) fn from_db(
        session: ExamSession,
        exam_name: String,
        time_remaining_seconds: Option<i64>,
        auto_save_interval_seconds: u64,
        references: Vec<ReferenceFile>,
    ) -> Self {
        let questions = session.question_list().iter().map(SessionQuestion::from).collect();
        Self {
            id: session.id,
            exam_id: session.exam_id,
            exam_name,
            status: session.status,
            attempt_number: session.attempt_number,
            question_kind: session.question_kind,
            questions,
            answers: session.answers.0,
            current_index: session.current_index,
            started_at: format_primitive(session.started_at),
            expires_at: session.expires_at.map(format_primitive),
            time_remaining_seconds,
            submitted_at: session.submitted_at.map(format_primitive),
            auto_submitted: session.auto_submitted,
            auto_save_interval_seconds,
            references,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProgressUpdate {
    #[serde(default)]
    pub(crate) answers: AnswerMap,
    #[serde(default, alias = "currentIndex", alias = "current_question_index")]
    pub(crate) current_index: Option<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProgressResponse {
    pub(crate) session_id: String,
    pub(crate) current_index: i32,
    pub(crate) answered: usize,
    pub(crate) saved_at: String,
    pub(crate) time_remaining_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) session_id: String,
    pub(crate) status: SessionStatus,
    pub(crate) submitted_at: Option<String>,
    pub(crate) auto_submitted: bool,
}

impl SubmitResponse {
    pub(crate) fn from_db(session: &ExamSession) -> Self {
        Self {
            session_id: session.id.clone(),
            status: session.status,
            submitted_at: session.submitted_at.map(format_primitive),
            auto_submitted: session.auto_submitted,
        }
    }
}
