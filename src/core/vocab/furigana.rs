//! Helpers for bracket-annotated Japanese text such as `日本[にほん]語[ご]`.
//!
//! A reading sits in square brackets directly after the kanji span it
//! belongs to. Annotated sentences put a space before an annotated span so
//! the reading attaches to the right characters; [`strip_furigana`] removes
//! that spacing again.

use regex::Regex;
use std::sync::LazyLock;

static BRACKET_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("bracket pattern is valid"));

static SPACE_BEFORE_JAPANESE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+([\p{Han}\p{Hiragana}\p{Katakana}々〆ー])")
        .expect("spacing pattern is valid")
});

/// True for characters that carry a bracketed reading instead of being read
/// directly (CJK ideographs plus the iteration marks).
pub fn is_logographic(c: char) -> bool {
    matches!(c,
        '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2FA1F}'
        | '々'
        | '〆'
    )
}

/// Reading of an annotated string: bracket contents replace the kanji they
/// annotate, everything else is copied in order.
///
/// An opening bracket without a closing one is treated as running to the end
/// of the input.
pub fn extract_pronunciation(annotated: &str) -> String {
    let mut out = String::with_capacity(annotated.len());
    let mut chars = annotated.chars();
    while let Some(c) = chars.next() {
        if c == '[' {
            for inner in chars.by_ref() {
                if inner == ']' {
                    break;
                }
                out.push(inner);
            }
        } else if c == ']' || is_logographic(c) {
            continue;
        } else {
            out.push(c);
        }
    }
    out
}

/// Plain written form: readings removed and annotation spacing collapsed.
pub fn strip_furigana(annotated: &str) -> String {
    let without_readings = BRACKET_SPAN.replace_all(annotated, "");
    SPACE_BEFORE_JAPANESE
        .replace_all(&without_readings, "$1")
        .trim()
        .to_string()
}

/// Pronunciation with the fallback chain used for CSV fields: the primary
/// annotated text, then an alternate field, then the untouched surface form.
pub fn derive_pronunciation(primary: &str, alternate: &str, surface: &str) -> String {
    let from_primary = extract_pronunciation(primary);
    if !from_primary.trim().is_empty() {
        return from_primary.trim().to_string();
    }
    let from_alternate = extract_pronunciation(alternate);
    if !from_alternate.trim().is_empty() {
        return from_alternate.trim().to_string();
    }
    surface.to_string()
}
