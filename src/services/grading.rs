use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::Context;
use regex::{Captures, Regex};

use crate::db::models::{AnswerMap, Exam, Question, ResultItem};
use crate::db::types::AnswerStatus;
use crate::services::ai_client::{AiClient, CompletionRequest};
use crate::services::answer_matching;
use crate::services::documents::DocumentPayload;

/// Full marks for a whole exam.
pub(crate) const MAX_SCORE: f64 = 10.0;

const GRADING_SYSTEM_PROMPT: &str = r#"Bạn là giáo viên chấm bài thi.
Chấm từng câu theo hướng dẫn của giáo viên, đáp án tham khảo và tài liệu đính kèm.
Thang điểm toàn bài là 10; các câu có số điểm bằng nhau.

Trả lời đúng định dạng sau cho MỖI câu, theo đúng thứ tự:

Câu 1:
Điểm: <điểm đạt được>/<điểm tối đa của câu>
Trạng thái: Đúng | Một phần | Sai
Đáp án đúng: <đáp án>
Giải thích: <nhận xét ngắn gọn>

Sau câu cuối cùng, ghi:
Tổng điểm: <tổng>/10
"#;

fn number_group() -> &'static str {
    r"(\d+(?:[.,]\d+)?)"
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?im)^[ \t>#*\-]*(?:câu|cau|question)[ \t]*(\d+)[ \t]*[:.)\-]?\**([^\n]*)$")
            .expect("question header regex")
    })
}

/// A labelled line: optional list or quote markers, the label, then a colon.
fn labelled(labels: &str, value: &str) -> String {
    format!(r"(?i)^[ \t>*\-]*(?:{labels})[ \t]*\**[ \t]*[:：][ \t]*\**[ \t]*{value}")
}

fn score_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let number = number_group();
        Regex::new(&labelled(
            "điểm|diem|score",
            &format!(r"{number}(?:[ \t]*/[ \t]*{number})?([ \t]*%)?"),
        ))
        .expect("score regex")
    })
}

fn percent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&labelled(
            r"tỷ[ \t]*lệ|tỉ[ \t]*lệ|ty[ \t]*le|percentage",
            &format!(r"{}[ \t]*%?", number_group()),
        ))
        .expect("percentage regex")
    })
}

fn status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&labelled(r"trạng[ \t]*thái|trang[ \t]*thai|status", "(.+)"))
            .expect("status regex")
    })
}

fn correct_answer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&labelled(
            r"đáp[ \t]*án[ \t]*đúng|dap[ \t]*an[ \t]*dung|correct[ \t]*answer",
            "(.+)",
        ))
        .expect("correct answer regex")
    })
}

fn explanation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&labelled(r"giải[ \t]*thích|giai[ \t]*thich|explanation", "(.*)"))
            .expect("explanation regex")
    })
}

fn is_labelled(line: &str) -> bool {
    score_pattern().is_match(line)
        || percent_pattern().is_match(line)
        || status_pattern().is_match(line)
        || correct_answer_pattern().is_match(line)
        || explanation_pattern().is_match(line)
}

fn total_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let number = number_group();
        Regex::new(&format!(
            r"(?i)(?:tổng\s*điểm|tong\s*diem|total\s*score)\s*\**\s*[:：]?\s*\**\s*{number}(?:\s*/\s*{number})?"
        ))
        .expect("total regex")
    })
}

/// What the model said about one question block.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct QuestionVerdict {
    pub(crate) points: Option<f64>,
    pub(crate) out_of: Option<f64>,
    pub(crate) percent: Option<f64>,
    pub(crate) status: Option<AnswerStatus>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GradingReport {
    /// Keyed by the 1-based question number used in the report.
    pub(crate) verdicts: BTreeMap<usize, QuestionVerdict>,
    /// Document-level total, already rescaled to 10.
    pub(crate) stated_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reconciled {
    pub(crate) items: Vec<ResultItem>,
    pub(crate) computed_total: f64,
    pub(crate) stated_total: Option<f64>,
    pub(crate) score: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct GradeOutcome {
    pub(crate) reconciled: Reconciled,
    pub(crate) feedback: String,
    pub(crate) model: String,
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok().filter(|value| value.is_finite())
}

fn capture_number(caps: &Captures<'_>, index: usize) -> Option<f64> {
    caps.get(index).and_then(|m| parse_number(m.as_str()))
}

fn clean_value(raw: &str) -> Option<String> {
    let value = raw.trim().trim_matches('*').trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Maps a status phrase onto a verdict. Negative forms are checked first
/// because `không đúng` and `chưa đúng` contain `đúng`.
pub(crate) fn parse_status(value: &str) -> Option<AnswerStatus> {
    let lowered = value.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    let has_word = |wanted: &str| words.iter().any(|word| *word == wanted);

    if lowered.contains("không đúng")
        || lowered.contains("khong dung")
        || lowered.contains("chưa đúng")
        || lowered.contains("chua dung")
        || lowered.contains("incorrect")
        || lowered.contains("not correct")
        || has_word("sai")
        || has_word("wrong")
        || lowered.contains('❌')
    {
        Some(AnswerStatus::Incorrect)
    } else if lowered.contains("một phần") || lowered.contains("mot phan") || lowered.contains("partial")
    {
        Some(AnswerStatus::Partial)
    } else if has_word("đúng") || lowered.contains("correct") || lowered.contains('✅') {
        Some(AnswerStatus::Correct)
    } else {
        None
    }
}

/// Reads the labelled lines of one question block. The explanation runs
/// until a blank line or the next label and never feeds score detection.
fn parse_block(header_rest: &str, body: &str) -> QuestionVerdict {
    let mut verdict = QuestionVerdict::default();
    let mut explanation: Option<Vec<&str>> = None;
    let mut explanation_done = false;

    for line in std::iter::once(header_rest).chain(body.lines()) {
        if let Some(lines) = explanation.as_mut().filter(|_| !explanation_done) {
            if line.trim().is_empty() || is_labelled(line) {
                explanation_done = true;
            } else {
                lines.push(line.trim_end());
                continue;
            }
        }

        if let Some(caps) = score_pattern().captures(line) {
            if caps.get(3).is_some() {
                if verdict.percent.is_none() {
                    verdict.percent = capture_number(&caps, 1);
                }
            } else if verdict.points.is_none() {
                verdict.points = capture_number(&caps, 1);
                verdict.out_of = capture_number(&caps, 2).filter(|out_of| *out_of > 0.0);
            }
        } else if let Some(caps) = percent_pattern().captures(line) {
            if verdict.percent.is_none() {
                verdict.percent = capture_number(&caps, 1);
            }
        } else if let Some(caps) = status_pattern().captures(line) {
            if verdict.status.is_none() {
                verdict.status = caps.get(1).and_then(|value| parse_status(value.as_str()));
            }
        } else if let Some(caps) = correct_answer_pattern().captures(line) {
            if verdict.correct_answer.is_none() {
                verdict.correct_answer = caps.get(1).and_then(|value| clean_value(value.as_str()));
            }
        } else if let Some(caps) = explanation_pattern().captures(line) {
            if explanation.is_none() {
                let first = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                explanation = Some(vec![first.trim_end()]);
            }
        }
    }

    if verdict.status.is_none() {
        verdict.status = parse_status(header_rest);
    }
    verdict.explanation = explanation.and_then(|lines| clean_value(&lines.join("\n")));

    verdict
}

/// Parses the model's free-text evaluation into per-question verdicts and the stated total.
pub(crate) fn parse_report(text: &str) -> GradingReport {
    let total_match = total_pattern().captures_iter(text).last();
    let stated_total = total_match.as_ref().and_then(|caps| {
        let value = capture_number(caps, 1)?;
        match capture_number(caps, 2).filter(|out_of| *out_of > 0.0) {
            Some(out_of) => Some(value / out_of * MAX_SCORE),
            None => Some(value),
        }
    });
    let total_start = total_match
        .as_ref()
        .and_then(|caps| caps.get(0))
        .map(|m| m.start())
        .unwrap_or(text.len());

    let headers: Vec<_> = header_pattern().captures_iter(text).collect();
    let mut verdicts = BTreeMap::new();

    for (position, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(number) = number.as_str().parse::<usize>() else {
            continue;
        };
        if number == 0 || verdicts.contains_key(&number) {
            continue;
        }

        let next_start = headers
            .get(position + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let mut end = next_start;
        if total_start > whole.end() && total_start < end {
            end = total_start;
        }
        let body = if whole.end() < end { &text[whole.end()..end] } else { "" };
        let header_rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

        verdicts.insert(number, parse_block(header_rest, body));
    }

    GradingReport { verdicts, stated_total }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

fn status_from_fraction(score: f64, max_score: f64) -> AnswerStatus {
    if score >= max_score - 1e-6 {
        AnswerStatus::Correct
    } else if score > 0.0 {
        AnswerStatus::Partial
    } else {
        AnswerStatus::Incorrect
    }
}

/// Combines the parsed report with local answer checks into the final result.
pub(crate) fn reconcile(
    questions: &[Question],
    answers: &AnswerMap,
    report: &GradingReport,
) -> Reconciled {
    let count = questions.len();
    let per_question = if count == 0 { 0.0 } else { MAX_SCORE / count as f64 };
    let mut items = Vec::with_capacity(count);
    let mut computed_total = 0.0;

    for (index, question) in questions.iter().enumerate() {
        let verdict = report.verdicts.get(&(index + 1));
        let user_answer = answers
            .get(&question.id)
            .map(|answer| answer.trim())
            .filter(|answer| !answer.is_empty())
            .map(str::to_string);

        let from_report = verdict.and_then(|verdict| {
            if let (Some(points), Some(out_of)) = (verdict.points, verdict.out_of) {
                return Some(points / out_of * per_question);
            }
            if let Some(points) = verdict.points {
                return Some(points);
            }
            if let Some(percent) = verdict.percent {
                return Some(percent / 100.0 * per_question);
            }
            verdict.status.and_then(AnswerStatus::credit).map(|credit| credit * per_question)
        });

        let (raw_score, status) = match from_report {
            Some(score) => {
                let clamped = score.clamp(0.0, per_question);
                let status = verdict
                    .and_then(|verdict| verdict.status)
                    .unwrap_or_else(|| status_from_fraction(clamped, per_question));
                (clamped, status)
            }
            None => match (&question.correct_answer, question.options.len() >= 2) {
                (Some(correct), true) => {
                    let matched = user_answer.as_deref().is_some_and(|answer| {
                        answer_matching::answers_match(answer, correct, &question.options)
                    });
                    if matched {
                        (per_question, AnswerStatus::Correct)
                    } else {
                        (0.0, AnswerStatus::Incorrect)
                    }
                }
                _ => (0.0, AnswerStatus::Ungraded),
            },
        };

        computed_total += raw_score;
        items.push(ResultItem {
            question_id: question.id.clone(),
            question: question.text.clone(),
            user_answer,
            correct_answer: verdict
                .and_then(|verdict| verdict.correct_answer.clone())
                .or_else(|| question.correct_answer.clone()),
            status,
            score: round_to(raw_score, 2),
            max_score: round_to(per_question, 2),
            explanation: verdict.and_then(|verdict| verdict.explanation.clone()),
        });
    }

    let best = match report.stated_total {
        Some(stated) => stated.max(computed_total),
        None => computed_total,
    };

    Reconciled {
        items,
        computed_total: round_to(computed_total, 2),
        stated_total: report.stated_total.map(|total| round_to(total, 2)),
        score: round_to(best.clamp(0.0, MAX_SCORE), 1),
    }
}

pub(crate) fn build_grading_prompt(exam: &Exam, questions: &[Question], answers: &AnswerMap) -> String {
    let mut prompt = format!(
        "Bài thi: {}\n\nHướng dẫn chấm của giáo viên:\n{}\n\nSố câu: {}\n",
        exam.name,
        exam.prompt,
        questions.len()
    );

    let mut last_passage: Option<&str> = None;
    for (index, question) in questions.iter().enumerate() {
        prompt.push_str(&format!("\nCâu {} (mã {}):\n", index + 1, question.id));

        if let Some(passage) = question.passage.as_deref() {
            if last_passage != Some(passage) {
                prompt.push_str(&format!("Đoạn văn:\n{passage}\n"));
            }
        }
        last_passage = question.passage.as_deref();

        prompt.push_str(&question.text);
        prompt.push('\n');
        for option in &question.options {
            prompt.push_str(&format!("  {option}\n"));
        }
        if let Some(correct) = question.correct_answer.as_deref() {
            prompt.push_str(&format!("Đáp án tham khảo: {correct}\n"));
        }

        let answer = answers
            .get(&question.id)
            .map(|answer| answer.trim())
            .filter(|answer| !answer.is_empty())
            .unwrap_or("(bỏ trống)");
        prompt.push_str(&format!("Bài làm của học sinh: {answer}\n"));
    }

    prompt
}

/// Sends one session's answers to the model and reconciles the reply.
pub(crate) async fn grade_answers(
    ai: &AiClient,
    exam: &Exam,
    questions: &[Question],
    answers: &AnswerMap,
    documents: &[DocumentPayload],
    trace_id: &str,
) -> anyhow::Result<GradeOutcome> {
    let completion = ai
        .complete(CompletionRequest {
            model: exam.ai_model.as_deref(),
            system_prompt: GRADING_SYSTEM_PROMPT,
            user_prompt: build_grading_prompt(exam, questions, answers),
            documents,
            json_response: false,
            trace_id,
        })
        .await
        .context("AI grading request failed")?;

    let report = parse_report(&completion.content);
    tracing::debug!(
        trace_id,
        verdicts = report.verdicts.len(),
        stated_total = ?report.stated_total,
        "Parsed grading report"
    );

    Ok(GradeOutcome {
        reconciled: reconcile(questions, answers, &report),
        feedback: completion.content,
        model: completion.model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::QuestionKind;

    fn mc(id: &str, correct: Option<&str>) -> Question {
        Question {
            id: id.to_string(),
            text: format!("Câu hỏi {id}"),
            options: vec!["A. một".into(), "B. hai".into(), "C. ba".into(), "D. bốn".into()],
            passage: None,
            group_id: None,
            correct_answer: correct.map(str::to_string),
            kind: QuestionKind::MultipleChoice,
        }
    }

    fn short(id: &str) -> Question {
        Question {
            id: id.to_string(),
            text: format!("Câu hỏi {id}"),
            options: Vec::new(),
            passage: None,
            group_id: None,
            correct_answer: None,
            kind: QuestionKind::ShortAnswer,
        }
    }

    fn answers(pairs: &[(&str, &str)]) -> AnswerMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    const REPORT: &str = "Nhận xét chung: bài làm khá.

**Câu 1:**
Điểm: 2,5/2,5
Trạng thái: Đúng
Đáp án đúng: B
Giải thích: Học sinh chọn đúng.

Câu 2: Một phần
Điểm: 1
Giải thích: Thiếu ý thứ hai.
Cần bổ sung ví dụ.

Câu 3
Tỷ lệ: 40%

Câu 4 - Sai
Đáp án đúng: **C**

Tổng điểm: 7/10";

    #[test]
    fn parses_vietnamese_report() {
        let report = parse_report(REPORT);
        assert_eq!(report.stated_total, Some(7.0));
        assert_eq!(report.verdicts.len(), 4);

        let first = &report.verdicts[&1];
        assert_eq!(first.points, Some(2.5));
        assert_eq!(first.out_of, Some(2.5));
        assert_eq!(first.status, Some(AnswerStatus::Correct));
        assert_eq!(first.correct_answer.as_deref(), Some("B"));
        assert_eq!(first.explanation.as_deref(), Some("Học sinh chọn đúng."));

        let second = &report.verdicts[&2];
        assert_eq!(second.points, Some(1.0));
        assert_eq!(second.out_of, None);
        assert_eq!(second.status, Some(AnswerStatus::Partial));
        assert_eq!(
            second.explanation.as_deref(),
            Some("Thiếu ý thứ hai.\nCần bổ sung ví dụ.")
        );

        assert_eq!(report.verdicts[&3].percent, Some(40.0));
        assert_eq!(report.verdicts[&3].points, None);
        assert_eq!(report.verdicts[&4].status, Some(AnswerStatus::Incorrect));
        assert_eq!(report.verdicts[&4].correct_answer.as_deref(), Some("C"));
    }

    #[test]
    fn parses_english_report_and_rescales_total() {
        let text = "Question 1\nScore: 3/4\nStatus: partially correct\n\nQuestion 2\nStatus: incorrect\nCorrect answer: Paris\n\nTotal score: 15/20";
        let report = parse_report(text);
        assert_eq!(report.stated_total, Some(7.5));
        assert_eq!(report.verdicts[&1].points, Some(3.0));
        assert_eq!(report.verdicts[&1].status, Some(AnswerStatus::Partial));
        assert_eq!(report.verdicts[&2].status, Some(AnswerStatus::Incorrect));
        assert_eq!(report.verdicts[&2].correct_answer.as_deref(), Some("Paris"));
    }

    #[test]
    fn percent_after_score_label_is_a_percentage() {
        let report = parse_report("Câu 1\nĐiểm: 80%\n");
        assert_eq!(report.verdicts[&1].points, None);
        assert_eq!(report.verdicts[&1].percent, Some(80.0));
    }

    #[test]
    fn numbers_in_explanation_do_not_score() {
        let questions = vec![short("a"), short("b")];
        let text = "Câu 1\nTrạng thái: Sai\nGiải thích: Bài viết đáp ứng 100% phần mở bài\nnhưng bị trừ điểm 5 lần vì lạc đề.\n\nCâu 2\nTrạng thái: Sai\nGiải thích: Score: 9 theo học sinh tự chấm.\n";
        let report = parse_report(text);

        let first = &report.verdicts[&1];
        assert_eq!(first.percent, None);
        assert_eq!(first.points, None);
        assert_eq!(
            first.explanation.as_deref(),
            Some("Bài viết đáp ứng 100% phần mở bài\nnhưng bị trừ điểm 5 lần vì lạc đề.")
        );
        assert_eq!(report.verdicts[&2].points, None);

        let result = reconcile(&questions, &AnswerMap::new(), &report);
        let items: Vec<(f64, AnswerStatus)> =
            result.items.iter().map(|item| (item.score, item.status)).collect();
        assert_eq!(items, vec![(0.0, AnswerStatus::Incorrect), (0.0, AnswerStatus::Incorrect)]);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn score_needs_its_own_label() {
        let report = parse_report("Câu 1\nĐạt điểm 5 trên thang 10\nMức độ hoàn thành 80%\nTrạng thái: Một phần\n");
        let verdict = &report.verdicts[&1];
        assert_eq!(verdict.points, None);
        assert_eq!(verdict.percent, None);
        assert_eq!(verdict.status, Some(AnswerStatus::Partial));
    }

    #[test]
    fn labelled_line_ends_explanation() {
        let report = parse_report("Câu 1\nGiải thích: thiếu lập luận\n- Điểm: 1/2\n");
        let verdict = &report.verdicts[&1];
        assert_eq!(verdict.explanation.as_deref(), Some("thiếu lập luận"));
        assert_eq!(verdict.points, Some(1.0));
        assert_eq!(verdict.out_of, Some(2.0));
    }

    #[test]
    fn status_keywords() {
        assert_eq!(parse_status("Đúng"), Some(AnswerStatus::Correct));
        assert_eq!(parse_status("không đúng"), Some(AnswerStatus::Incorrect));
        assert_eq!(parse_status("Chưa đúng"), Some(AnswerStatus::Incorrect));
        assert_eq!(parse_status("not correct"), Some(AnswerStatus::Incorrect));
        assert_eq!(parse_status("Đúng một phần"), Some(AnswerStatus::Partial));
        assert_eq!(parse_status("SAI"), Some(AnswerStatus::Incorrect));
        assert_eq!(parse_status("wrong answer"), Some(AnswerStatus::Incorrect));
        assert_eq!(parse_status("nội dung"), None);
    }

    #[test]
    fn reconciles_by_source_precedence() {
        let questions = vec![mc("a", Some("B")), short("b"), short("c"), mc("d", Some("C"))];
        let answers = answers(&[("a", "B"), ("b", "x"), ("c", "y"), ("d", "A")]);
        let mut report = parse_report(REPORT);
        report.stated_total = None;

        let result = reconcile(&questions, &answers, &report);
        let scores: Vec<f64> = result.items.iter().map(|item| item.score).collect();
        // x/y, bare x, percentage, status
        assert_eq!(scores, vec![2.5, 1.0, 1.0, 0.0]);
        assert_eq!(result.items[2].status, AnswerStatus::Partial);
        assert_eq!(result.items[3].correct_answer.as_deref(), Some("C"));
        assert_eq!(result.computed_total, 4.5);
        assert_eq!(result.score, 4.5);
    }

    #[test]
    fn stated_total_wins_when_higher() {
        let questions = vec![mc("a", Some("B")), short("b"), short("c"), mc("d", Some("C"))];
        let answers = answers(&[("a", "B")]);
        let result = reconcile(&questions, &answers, &parse_report(REPORT));
        assert_eq!(result.stated_total, Some(7.0));
        assert_eq!(result.score, 7.0);
    }

    #[test]
    fn local_check_and_ungraded_fallbacks() {
        let questions = vec![mc("a", Some("B")), mc("b", Some("A")), short("c")];
        let answers = answers(&[("a", "(b)"), ("b", "C"), ("c", "gì đó")]);
        let result = reconcile(&questions, &answers, &GradingReport::default());

        assert_eq!(result.items[0].status, AnswerStatus::Correct);
        assert_eq!(result.items[0].score, 3.33);
        assert_eq!(result.items[1].status, AnswerStatus::Incorrect);
        assert_eq!(result.items[2].status, AnswerStatus::Ungraded);
        assert_eq!(result.items[2].score, 0.0);
        assert_eq!(result.score, 3.3);
    }

    #[test]
    fn scores_are_clamped() {
        let questions = vec![short("a"), short("b")];
        let text = "Câu 1\nĐiểm: 9\nCâu 2\nĐiểm: -2\nTổng điểm: 14";
        let result = reconcile(&questions, &AnswerMap::new(), &parse_report(text));
        assert_eq!(result.items[0].score, 5.0);
        assert_eq!(result.items[1].score, 0.0);
        assert_eq!(result.score, 10.0);
    }

    #[test]
    fn empty_question_set_scores_stated_total() {
        let report = parse_report("Tổng điểm: 6,5");
        let result = reconcile(&[], &AnswerMap::new(), &report);
        assert!(result.items.is_empty());
        assert_eq!(result.score, 6.5);
    }

    #[test]
    fn prompt_lists_answers_and_blanks() {
        let exam = crate::test_support::sample_exam();
        let mut first = mc("a", Some("B"));
        first.passage = Some("Đoạn chung".into());
        let mut second = short("b");
        second.passage = Some("Đoạn chung".into());
        let prompt = build_grading_prompt(&exam, &[first, second], &answers(&[("a", "B")]));

        assert_eq!(prompt.matches("Đoạn chung").count(), 1);
        assert!(prompt.contains("Câu 1 (mã a)"));
        assert!(prompt.contains("Bài làm của học sinh: B"));
        assert!(prompt.contains("Bài làm của học sinh: (bỏ trống)"));
    }
}
