use thiserror::Error;

use crate::db::models::{AnswerMap, Question};

/// Longest free-text answer accepted for one question.
pub(crate) const MAX_ANSWER_CHARS: usize = 20_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ProgressError {
    #[error("Unknown question id '{0}'")]
    UnknownQuestion(String),
    #[error("Question index {index} is out of range for {count} questions")]
    IndexOutOfRange { index: i32, count: usize },
    #[error("Answer for question '{0}' is too long")]
    AnswerTooLong(String),
}

pub(crate) fn validate_index(index: i32, count: usize) -> Result<(), ProgressError> {
    let in_range = if count == 0 { index == 0 } else { index >= 0 && (index as usize) < count };
    if in_range {
        Ok(())
    } else {
        Err(ProgressError::IndexOutOfRange { index, count })
    }
}

/// Merges `updates` into the saved answers. An empty value clears that answer.
pub(crate) fn merge_answers(
    questions: &[Question],
    saved: &AnswerMap,
    updates: &AnswerMap,
) -> Result<AnswerMap, ProgressError> {
    let mut merged = saved.clone();

    for (question_id, answer) in updates {
        if !questions.iter().any(|question| &question.id == question_id) {
            return Err(ProgressError::UnknownQuestion(question_id.clone()));
        }
        if answer.chars().count() > MAX_ANSWER_CHARS {
            return Err(ProgressError::AnswerTooLong(question_id.clone()));
        }

        if answer.trim().is_empty() {
            merged.remove(question_id);
        } else {
            merged.insert(question_id.clone(), answer.clone());
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::QuestionKind;

    fn questions() -> Vec<Question> {
        ["q1", "q2", "q3"]
            .into_iter()
            .map(|id| Question {
                id: id.to_string(),
                text: "?".to_string(),
                options: Vec::new(),
                passage: None,
                group_id: None,
                correct_answer: None,
                kind: QuestionKind::ShortAnswer,
            })
            .collect()
    }

    fn map(pairs: &[(&str, &str)]) -> AnswerMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn merges_and_clears() {
        let saved = map(&[("q1", "A"), ("q2", "B")]);
        let merged = merge_answers(&questions(), &saved, &map(&[("q2", ""), ("q3", "C")])).unwrap();
        assert_eq!(merged, map(&[("q1", "A"), ("q3", "C")]));
    }

    #[test]
    fn rejects_unknown_question() {
        let err = merge_answers(&questions(), &AnswerMap::new(), &map(&[("q9", "A")])).unwrap_err();
        assert_eq!(err, ProgressError::UnknownQuestion("q9".to_string()));
    }

    #[test]
    fn rejects_oversized_answer() {
        let long = "x".repeat(MAX_ANSWER_CHARS + 1);
        let err = merge_answers(&questions(), &AnswerMap::new(), &map(&[("q1", &long)])).unwrap_err();
        assert_eq!(err, ProgressError::AnswerTooLong("q1".to_string()));
    }

    #[test]
    fn index_bounds() {
        assert!(validate_index(0, 3).is_ok());
        assert!(validate_index(2, 3).is_ok());
        assert!(validate_index(3, 3).is_err());
        assert!(validate_index(-1, 3).is_err());
        assert!(validate_index(0, 0).is_ok());
    }
}
