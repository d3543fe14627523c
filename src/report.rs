use crate::agent::FINAL_ANSWER_MARKER;
use crate::sanitize::sanitize;

/// Wraps the reasoning output into the final report body. Pure and total:
/// scaffold markers are stripped, and empty or "no news" output degrades to
/// the no-items shape instead of echoing malformed text.
///
/// The body itself is agent-produced markup and is trusted verbatim — feed
/// text was already sanitized before the agent ever saw it.
pub fn format_report(output: &str, date: &str) -> String {
    let body = output.replace(FINAL_ANSWER_MARKER, "");
    let body = body.trim();

    if body.is_empty() || body.to_lowercase().contains("no news") {
        format!(
            "📊 <b>Market Update</b>\n{}\n\n⚠️ No new items found in RSS feeds.",
            date
        )
    } else {
        format!(
            "📊 <b>Market Intelligence Report</b>\n{}\n\n{}",
            date, body
        )
    }
}

/// Builds the distinct message shape for faults that escape the pipeline.
/// The detail is sanitized and bounded so an arbitrary error chain cannot
/// break Telegram HTML parsing or exceed message limits.
pub fn error_message(detail: &str, date: &str, max_chars: usize) -> String {
    format!(
        "❌ <b>System Error</b>\n{}\n\n<code>{}</code>",
        date,
        truncate_entity_safe(&sanitize(detail), max_chars)
    )
}

/// Truncates to `max` chars without leaving a severed entity (a bare `&`
/// tail would re-introduce the character the sanitizer just escaped).
fn truncate_entity_safe(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if let Some(idx) = out.rfind('&') {
        if !out[idx..].contains(';') {
            out.truncate(idx);
        }
    }
    out
}
