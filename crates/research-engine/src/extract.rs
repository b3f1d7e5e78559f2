//! Text-extraction contract between model output and the session controller.
//!
//! The model is instructed to emit suggestion lists under exact header
//! lines; extraction is best-effort with a keyword fallback, and failure is
//! always an empty list, never an error.

use std::sync::LazyLock;

use regex::Regex;

/// Exact header line (case-insensitive) preceding initial-scan suggestions.
pub const SUGGESTIONS_HEADER: &str = "Suggested Deep Dive Topics:";

/// Exact header line (case-insensitive) preceding deep-dive refinements.
pub const REFINEMENTS_HEADER: &str = "Further Refinement Suggestions:";

/// Keyword hints for the fallback suggestion strategy.
const SUGGESTION_KEYWORDS: [&str; 5] = [
    "suggested topics",
    "explore further",
    "deep dive",
    "key questions",
    "areas to investigate",
];

/// How many lines past a keyword hint to look before giving up on a block.
const KEYWORD_SCAN_WINDOW: usize = 10;

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.?\s+(.+)$").unwrap());

static BULLET_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-*+]\s+(.+)$").unwrap());

static LINE_BREAKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\r\n|\r|\n)+").unwrap());

/// Extract suggested sub-topics from an initial-scan response.
///
/// Strategy 1: the exact [`SUGGESTIONS_HEADER`] line followed by contiguous
/// numbered items. Strategy 2 (only when Strategy 1 found nothing): a line
/// containing one of the keyword hints, followed by numbered or bulleted
/// items. A block ends at the first blank or non-matching line after at
/// least one item was captured.
pub fn extract_suggestions(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut suggestions = Vec::new();

    if let Some(header_idx) = lines
        .iter()
        .position(|line| line.trim().eq_ignore_ascii_case(SUGGESTIONS_HEADER))
    {
        for line in &lines[header_idx + 1..] {
            let trimmed = line.trim();
            if let Some(caps) = NUMBERED_ITEM.captures(trimmed) {
                suggestions.push(caps[2].trim().to_string());
            } else if !suggestions.is_empty() {
                break;
            }
        }
    }

    if suggestions.is_empty() {
        extract_by_keywords(&lines, &mut suggestions);
    }

    suggestions
}

fn extract_by_keywords(lines: &[&str], suggestions: &mut Vec<String>) {
    let mut capture = false;
    let mut keyword_line = 0usize;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();

        if !capture && SUGGESTION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            capture = true;
            keyword_line = i;
            continue;
        }

        if capture {
            if let Some(caps) = NUMBERED_ITEM.captures(trimmed) {
                suggestions.push(caps[2].trim().to_string());
                continue;
            }
            if let Some(caps) = BULLET_ITEM.captures(trimmed) {
                suggestions.push(caps[1].trim().to_string());
                continue;
            }
            // Close this block, but keep scanning: another hint may appear
            // later in the text.
            if !suggestions.is_empty() || i - keyword_line > KEYWORD_SCAN_WINDOW {
                capture = false;
            }
        }
    }
}

/// Extract the trailing refinement list from a deep-dive response: the exact
/// [`REFINEMENTS_HEADER`] line, then contiguous bulleted items.
pub fn extract_refinements(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut refinements = Vec::new();

    let Some(header_idx) = lines
        .iter()
        .position(|line| line.trim().eq_ignore_ascii_case(REFINEMENTS_HEADER))
    else {
        return refinements;
    };

    for line in &lines[header_idx + 1..] {
        let trimmed = line.trim();
        if let Some(caps) = BULLET_ITEM.captures(trimmed) {
            refinements.push(caps[1].trim().to_string());
        } else if !refinements.is_empty() {
            break;
        }
    }

    refinements
}

/// Remove a surrounding ```` ```markdown ```` or generic ```` ``` ```` fence,
/// only when both the leading and trailing fence are present.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix("```markdown")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// Single-line summary of a text block: line breaks collapsed, truncated to
/// `max_len` characters with an ellipsis.
pub fn summarize(text: &str, max_len: usize) -> String {
    if text.is_empty() {
        return "[No content]".to_string();
    }
    let flattened = LINE_BREAKS.replace_all(text, " ");
    let flattened = flattened.trim();
    if flattened.chars().count() <= max_len {
        return flattened.to_string();
    }
    let truncated: String = flattened.chars().take(max_len).collect();
    format!("{truncated}...")
}
