/// Escapes the characters that break Telegram HTML parsing.
///
/// `&` must be replaced before `<` and `>` so the entities produced by the
/// later substitutions are not double-encoded. Quotes are left alone —
/// Telegram only trips on `&`, `<`, `>` in text nodes. Every other
/// character, including Unicode, passes through unchanged.
pub fn sanitize(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
