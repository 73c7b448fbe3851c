//! Local comparison of student answers against known answers.

use std::sync::OnceLock;

use regex::Regex;

/// Option letters a choice can resolve to; matches the `a-h` range below.
const CHOICE_LETTERS: &[u8] = b"ABCDEFGH";

fn letter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:(?:đáp\s*án|dap\s*an|answer|chọn|chon)\s*[:\-]?\s*)?\(?([a-h])\s*[\.\):]?\s*$",
        )
        .expect("choice letter regex")
    })
}

fn option_prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*\(?([a-h])\s*[\.\):]\s*").expect("option prefix regex")
    })
}

/// Collapses whitespace and lowercases.
pub(crate) fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Upper-case choice letter from `A`, `a.`, `(b)`, `C)`, `Đáp án D`.
pub(crate) fn choice_letter(value: &str) -> Option<char> {
    letter_pattern()
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|letter| letter.as_str().chars().next())
        .map(|letter| letter.to_ascii_uppercase())
}

fn option_body(option: &str) -> &str {
    match option_prefix_pattern().find(option) {
        Some(prefix) => &option[prefix.end()..],
        None => option,
    }
}

/// Resolves an answer to an option letter: by letter first, then by full option text.
pub(crate) fn resolve_choice(answer: &str, options: &[String]) -> Option<char> {
    if let Some(letter) = choice_letter(answer) {
        let index = (letter as u8 - b'A') as usize;
        if options.is_empty() || index < options.len() {
            return Some(letter);
        }
    }

    let wanted = normalize_text(option_body(answer));
    if wanted.is_empty() {
        return None;
    }
    options.iter().zip(CHOICE_LETTERS).find_map(|(option, letter)| {
        let matches = normalize_text(option) == normalize_text(answer)
            || normalize_text(option_body(option)) == wanted;
        matches.then_some(*letter as char)
    })
}

/// Whether `answer` matches `correct`. Multiple-choice questions compare letters;
/// everything else compares normalised text.
pub(crate) fn answers_match(answer: &str, correct: &str, options: &[String]) -> bool {
    if answer.trim().is_empty() || correct.trim().is_empty() {
        return false;
    }

    if options.len() >= 2 {
        if let (Some(given), Some(expected)) =
            (resolve_choice(answer, options), resolve_choice(correct, options))
        {
            return given == expected;
        }
    }

    normalize_text(answer) == normalize_text(correct)
}
