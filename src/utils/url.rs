//! URL helpers shared by the probe, chat, and transcription builders.
//!
//! Base URLs come from the provider catalog and may carry trailing
//! slashes; endpoints are joined without producing double slashes, and
//! query-parameter authentication is appended last.

/// Normalize a base URL by removing trailing slashes.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path into a full endpoint URL.
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// Append an API key as a `key` query parameter.
///
/// Used by providers that authenticate via the query string rather than
/// an `Authorization` header.
pub fn append_key_param(url: &str, api_key: &str) -> String {
    if url.contains('?') {
        format!("{url}&key={api_key}")
    } else {
        format!("{url}?key={api_key}")
    }
}
