use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));
static WS_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Canonical text form used on both sides of every diff: HTML tags removed,
/// the feed's mangled `®`/`°` spellings repaired, whitespace runs collapsed,
/// ends trimmed. Idempotent.
pub fn normalize_text(input: &str) -> String {
    let stripped = HTML_TAG.replace_all(input, "");
    let repaired = stripped.replace("\u{00AC}\u{00C6}", "\u{00AE}").replace("&deg;", "\u{00B0}");
    let collapsed = WS_RUN.replace_all(&repaired, " ");
    collapsed.trim().to_string()
}
