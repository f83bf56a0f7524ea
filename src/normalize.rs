//! Text cleaning applied to every free-text field before it reaches the sink.

use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    non_ascii: Regex,
    markup_tag: Regex,
    disallowed: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        non_ascii: Regex::new(r"[^\x00-\x7F]+").expect("static regex"),
        markup_tag: Regex::new(r"</?[A-Za-z][^<>]*>").expect("static regex"),
        disallowed: Regex::new(r"[^A-Za-z0-9\s,.!?-]").expect("static regex"),
        whitespace: Regex::new(r"\s+").expect("static regex"),
    })
}

/// Flatten line breaks, drop non-ASCII (emoji and non-Latin scripts alike),
/// drop `<...>` markup, keep only alphanumerics, whitespace and `, . ! ? -`,
/// then collapse whitespace and trim. Total over any input.
pub fn clean_text(text: &str) -> String {
    let p = patterns();
    let text = text.replace(['\n', '\r'], " ");
    let text = p.non_ascii.replace_all(&text, "");
    let text = p.markup_tag.replace_all(&text, "");
    let text = p.disallowed.replace_all(&text, "");
    p.whitespace.replace_all(&text, " ").trim().to_string()
}
