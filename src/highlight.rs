use std::ops::Range;

use regex::{Regex, RegexBuilder};

/// Case-insensitive literal matcher for the active search term.
pub fn build_highlight_regex(term: &str) -> Option<Regex> {
    if term.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Splits `text` into alternating plain and matched spans, covering it exactly.
pub fn split_matches<'t>(regex: Option<&Regex>, text: &'t str) -> Vec<(&'t str, bool)> {
    let Some(regex) = regex else {
        return vec![(text, false)];
    };
    let mut spans = Vec::new();
    let mut cursor = 0;
    for Range { start, end } in regex.find_iter(text).map(|m| m.range()) {
        if start > cursor {
            spans.push((&text[cursor..start], false));
        }
        spans.push((&text[start..end], true));
        cursor = end;
    }
    if cursor < text.len() || spans.is_empty() {
        spans.push((&text[cursor..], false));
    }
    spans
}
