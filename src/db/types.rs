use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Teacher,
    Student,
}

impl UserRole {
    pub(crate) fn can_author_exams(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Teacher)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "sessionstatus", rename_all = "lowercase")]
pub(crate) enum SessionStatus {
    Active,
    Submitted,
    Grading,
    Graded,
    Failed,
}

/// Shape of an extracted question, or of a whole question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questionkind", rename_all = "snake_case")]
pub(crate) enum QuestionKind {
    MultipleChoice,
    ShortAnswer,
    Essay,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AnswerStatus {
    Correct,
    Partial,
    Incorrect,
    Ungraded,
}

impl AnswerStatus {
    pub(crate) fn credit(self) -> Option<f64> {
        match self {
            AnswerStatus::Correct => Some(1.0),
            AnswerStatus::Partial => Some(0.5),
            AnswerStatus::Incorrect => Some(0.0),
            AnswerStatus::Ungraded => None,
        }
    }
}
