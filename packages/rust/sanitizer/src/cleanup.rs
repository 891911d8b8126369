//! Post-extraction cleanup passes for sanitized rich text.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on extracted plain text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = text.to_string();

    result = normalize_line_endings(&result);
    result = collapse_blank_lines(&result);
    result = trim_edges(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Normalize line endings
// ---------------------------------------------------------------------------

/// Turn `\r\n` and lone `\r` into `\n`.
fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank (or whitespace-only) lines into exactly one.
fn collapse_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Trim
// ---------------------------------------------------------------------------

fn trim_edges(text: &str) -> String {
    text.trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
