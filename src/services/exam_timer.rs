use std::sync::OnceLock;

use regex::Regex;
use time::{Duration, PrimitiveDateTime};

/// Upper bound for a directive; anything longer is treated as a typo.
const MAX_DIRECTIVE_MINUTES: u32 = 24 * 60;

fn directive_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,4})\s*(?:phút|phut|minutes?|mins?)\b")
            .expect("duration directive regex")
    })
}

/// Reads the first `N phút` (or `N minutes`) directive from an exam prompt.
pub(crate) fn parse_duration_directive(prompt: &str) -> Option<Duration> {
    directive_pattern()
        .captures_iter(prompt)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .find(|minutes| *minutes > 0 && *minutes <= MAX_DIRECTIVE_MINUTES)
        .map(|minutes| Duration::minutes(minutes as i64))
}

/// Earliest of `started_at + duration` and the exam deadline; `None` means untimed.
pub(crate) fn compute_expiration(
    started_at: PrimitiveDateTime,
    duration: Option<Duration>,
    deadline: Option<PrimitiveDateTime>,
) -> Option<PrimitiveDateTime> {
    let by_duration = duration.map(|duration| started_at + duration);
    match (by_duration, deadline) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

pub(crate) fn remaining_seconds(
    expires_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> Option<i64> {
    expires_at.map(|expires_at| (expires_at - now).whole_seconds().max(0))
}

pub(crate) fn is_expired(expires_at: Option<PrimitiveDateTime>, now: PrimitiveDateTime) -> bool {
    matches!(expires_at, Some(expires_at) if now >= expires_at)
}

/// Whether a timed session has passed its submit grace window and is due
/// for auto-submission.
pub(crate) fn auto_submit_due(
    expires_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
    grace_seconds: u64,
) -> bool {
    expires_at.is_some() && !within_submit_grace(expires_at, now, grace_seconds)
}

/// Whether a manual submit still counts once the timer has run out.
pub(crate) fn within_submit_grace(
    expires_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
    grace_seconds: u64,
) -> bool {
    match expires_at {
        Some(expires_at) => now <= expires_at + Duration::seconds(grace_seconds as i64),
        None => true,
    }
}
