use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::{ExamResult, ResultItem};
use crate::db::types::SessionStatus;
use crate::repositories::results::ResultSummaryRow;
use crate::services::grading::MAX_SCORE;

#[derive(Debug, Serialize)]
pub(crate) struct ResultResponse {
    pub(crate) id: String,
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) stated_total: Option<f64>,
    pub(crate) computed_total: f64,
    pub(crate) items: Vec<ResultItem>,
    pub(crate) feedback: String,
    pub(crate) model: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl ResultResponse {
    pub(crate) fn from_db(result: ExamResult) -> Self {
        Self {
            id: result.id,
            session_id: result.session_id,
            exam_id: result.exam_id,
            user_id: result.user_id,
            score: result.score,
            max_score: MAX_SCORE,
            stated_total: result.stated_total,
            computed_total: result.computed_total,
            items: result.items.0,
            feedback: result.feedback,
            model: result.model,
            created_at: format_primitive(result.created_at),
            updated_at: format_primitive(result.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PendingResult {
    pub(crate) session_id: String,
    pub(crate) status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) detail: Option<String>,
}

/// Either the stored result or the session state while it is not graded yet.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum SessionResultResponse {
    Ready(Box<ResultResponse>),
    Pending(PendingResult),
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultSummaryResponse {
    pub(crate) id: String,
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_name: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) auto_submitted: bool,
    pub(crate) created_at: String,
}

impl ResultSummaryResponse {
    pub(crate) fn from_row(row: ResultSummaryRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            exam_id: row.exam_id,
            exam_name: row.exam_name,
            user_id: row.user_id,
            username: row.username,
            full_name: row.full_name,
            score: row.score,
            max_score: MAX_SCORE,
            auto_submitted: row.auto_submitted,
            created_at: format_primitive(row.created_at),
        }
    }
}
