use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::db::models::{Exam, Question};
use crate::db::types::QuestionKind;
use crate::services::ai_client::{AiClient, CompletionRequest};
use crate::services::documents::DocumentPayload;
use crate::services::json_extract;

const EXTRACTION_SYSTEM_PROMPT: &str = r#"Bạn là trợ lý ra đề thi cho giáo viên.
Nhiệm vụ: đọc yêu cầu của giáo viên và các tài liệu đính kèm, sau đó trích xuất
hoặc soạn câu hỏi cho học sinh làm bài.

Quy tắc:
- Giữ nguyên nội dung câu hỏi nếu tài liệu đã có sẵn đề.
- Câu trắc nghiệm phải có các lựa chọn A, B, C, D.
- Các câu dùng chung một đoạn văn phải có cùng "groupId" và lặp lại "passage".
- Không giải thích, không thêm văn bản ngoài JSON.

Định dạng trả lời (JSON):
{
  "questions": [
    {
      "id": "q1",
      "question": "nội dung câu hỏi",
      "options": ["A. ...", "B. ...", "C. ...", "D. ..."],
      "passage": null,
      "groupId": null,
      "correctAnswer": "A"
    }
  ]
}
"#;

/// Longest question text that still reads as a short answer.
const ESSAY_MIN_CHARS: usize = 200;

const ESSAY_CUES: &[&str] = &[
    "trình bày",
    "phân tích",
    "giải thích",
    "viết đoạn",
    "bài luận",
    "nghị luận",
    "essay",
    "explain",
    "discuss",
    "describe",
];

#[derive(Debug, Error)]
pub(crate) enum ExtractionError {
    #[error("AI service failed: {0}")]
    Ai(String),
    #[error("model response contains no question JSON")]
    NoJson,
    #[error("model response contains no usable questions")]
    NoQuestions,
}

#[derive(Debug, Clone)]
pub(crate) struct ExtractedSet {
    pub(crate) questions: Vec<Question>,
    pub(crate) kind: QuestionKind,
    pub(crate) model: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionPayload {
    Wrapped { questions: Vec<Map<String, Value>> },
    List(Vec<Map<String, Value>>),
}

impl QuestionPayload {
    fn into_items(self) -> Vec<Map<String, Value>> {
        match self {
            QuestionPayload::Wrapped { questions } => questions,
            QuestionPayload::List(items) => items,
        }
    }
}

pub(crate) async fn extract_questions(
    ai: &AiClient,
    exam: &Exam,
    documents: &[DocumentPayload],
    default_count: u32,
) -> Result<ExtractedSet, ExtractionError> {
    let requested = exam.question_count.map(|count| count.max(1) as u32).unwrap_or(default_count);
    let user_prompt = build_user_prompt(exam, requested, documents.len());

    let completion = ai
        .complete(CompletionRequest {
            model: exam.ai_model.as_deref(),
            system_prompt: EXTRACTION_SYSTEM_PROMPT,
            user_prompt,
            documents,
            json_response: true,
            trace_id: &exam.id,
        })
        .await
        .map_err(|err| {
            metrics::counter!("question_extractions_total", "status" => "ai_error").increment(1);
            ExtractionError::Ai(format!("{err:#}"))
        })?;

    let mut questions = match parse_questions(&completion.content) {
        Ok(questions) => questions,
        Err(err) => {
            metrics::counter!("question_extractions_total", "status" => "parse_error").increment(1);
            tracing::warn!(
                exam_id = %exam.id,
                error = %err,
                response_len = completion.content.len(),
                "Question extraction produced no usable set"
            );
            return Err(err);
        }
    };

    if exam.question_count.is_some() {
        questions.truncate(requested as usize);
    }

    let kind = classify_set(&questions).unwrap_or(QuestionKind::ShortAnswer);
    metrics::counter!("question_extractions_total", "status" => "success").increment(1);
    tracing::info!(
        exam_id = %exam.id,
        questions = questions.len(),
        kind = ?kind,
        model = %completion.model,
        "Questions extracted"
    );

    Ok(ExtractedSet { questions, kind, model: completion.model })
}

fn build_user_prompt(exam: &Exam, question_count: u32, document_count: usize) -> String {
    let documents = if document_count == 0 {
        "Không có tài liệu đính kèm; hãy soạn câu hỏi dựa trên yêu cầu.".to_string()
    } else {
        format!("Có {document_count} tài liệu đính kèm.")
    };

    format!(
        "Tên bài thi: {}\n\nYêu cầu của giáo viên:\n{}\n\n{}\n\nHãy tạo đúng {} câu hỏi và trả lời bằng JSON theo định dạng đã cho.",
        exam.name, exam.prompt, documents, question_count
    )
}

/// Parses the first question list found in the model output.
pub(crate) fn parse_questions(text: &str) -> Result<Vec<Question>, ExtractionError> {
    if json_extract::find_json_spans(text).is_empty() {
        return Err(ExtractionError::NoJson);
    }

    let items = json_extract::find_map_spans(text, |slice| {
        serde_json::from_str::<QuestionPayload>(slice)
            .ok()
            .map(QuestionPayload::into_items)
            .filter(|items| !items.is_empty())
    })
    .ok_or(ExtractionError::NoQuestions)?;

    let drafts: Vec<Question> = items.iter().filter_map(question_from_map).collect();
    if drafts.is_empty() {
        return Err(ExtractionError::NoQuestions);
    }

    Ok(assign_ids(drafts))
}

fn question_from_map(item: &Map<String, Value>) -> Option<Question> {
    let text = first_text(item, &["question", "text", "content"])?;
    let options = item
        .get("options")
        .or_else(|| item.get("choices"))
        .map(options_from_value)
        .unwrap_or_default();
    let kind = classify_question(&text, &options);

    Some(Question {
        id: first_text(item, &["id"]).unwrap_or_default(),
        text,
        options,
        passage: first_text(item, &["passage"]),
        group_id: first_text(item, &["groupId", "group_id"]),
        correct_answer: first_text(item, &["correctAnswer", "correct_answer", "answer"]),
        kind,
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn first_text(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| item.get(*key).and_then(scalar_text))
}

fn options_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => first_text(map, &["text", "content", "value"]),
                other => scalar_text(other),
            })
            .collect(),
        Value::Object(map) => {
            let mut lettered: Vec<(&String, String)> = map
                .iter()
                .filter_map(|(letter, text)| scalar_text(text).map(|text| (letter, text)))
                .collect();
            lettered.sort_by(|a, b| a.0.cmp(b.0));
            lettered
                .into_iter()
                .map(|(letter, text)| format!("{}. {}", letter.trim(), text))
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Replaces missing or repeated ids with `q<position>`, skipping ids already taken.
fn assign_ids(mut questions: Vec<Question>) -> Vec<Question> {
    let mut seen = HashSet::new();
    let mut needs_id = Vec::new();
    for (index, question) in questions.iter().enumerate() {
        if question.id.is_empty() || !seen.insert(question.id.clone()) {
            needs_id.push(index);
        }
    }

    for index in needs_id {
        let mut n = index + 1;
        let mut candidate = format!("q{n}");
        while seen.contains(&candidate) {
            n += 1;
            candidate = format!("q{n}");
        }
        seen.insert(candidate.clone());
        questions[index].id = candidate;
    }

    questions
}

pub(crate) fn classify_question(text: &str, options: &[String]) -> QuestionKind {
    if options.len() >= 2 {
        return QuestionKind::MultipleChoice;
    }

    let lowered = text.to_lowercase();
    if text.chars().count() > ESSAY_MIN_CHARS || ESSAY_CUES.iter().any(|cue| lowered.contains(cue)) {
        QuestionKind::Essay
    } else {
        QuestionKind::ShortAnswer
    }
}

/// Common kind of the set, `Mixed` when kinds differ, `None` for an empty set.
pub(crate) fn classify_set(questions: &[Question]) -> Option<QuestionKind> {
    let first = questions.first()?.kind;
    if questions.iter().all(|question| question.kind == first) {
        Some(first)
    } else {
        Some(QuestionKind::Mixed)
    }
}
