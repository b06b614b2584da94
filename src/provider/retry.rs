use std::collections::HashMap;
use std::time::Duration;

/// Extracts the `Retry-After` header (in seconds) if present.
///
/// The value is only reported on [`crate::error::LLMError::Api`]; the client never retries.
/// HTTP-date values are ignored because vendors use the numeric form.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
