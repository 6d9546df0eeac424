use std::borrow::Cow;

use serde::de::DeserializeOwned;

use super::GatewayError;

/// Parse a model response as `T`.
///
/// Only surrounding whitespace is tolerated. Code fences, prose before or
/// after the object, and trailing data are all malformed.
pub fn parse_strict<T: DeserializeOwned>(raw: &str) -> Result<T, GatewayError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::malformed("empty response", raw));
    }
    serde_json::from_str(trimmed).map_err(|e| GatewayError::malformed(e.to_string(), raw))
}

/// Cut `text` to `max_chars` characters for logging. 0 means no limit.
pub fn truncate_for_log(text: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed(text);
    }
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => Cow::Owned(format!(
            "{}... [truncated to {max_chars} chars]",
            &text[..cut]
        )),
    }
}
