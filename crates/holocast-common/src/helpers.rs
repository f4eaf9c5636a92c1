//! Common helper functions for Holocast.

/// Trim whitespace and trailing slashes from a base URL.
pub fn normalize_server_url(server: &str) -> String {
    server.trim().trim_end_matches('/').to_string()
}

/// Mask a secret for display, keeping only the last four characters.
pub fn redact_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

/// Pull a human-readable message out of a provider error body.
///
/// Accepts `{"message": ..}`, `{"error": {"message": ..}}` and `{"error": ".."}`.
/// Returns `None` if the body is not JSON or carries no usable message.
pub fn provider_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value
        .get("message")
        .and_then(|v| v.as_str())
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.get("message"))
                .and_then(|v| v.as_str())
        })
        .or_else(|| value.get("error").and_then(|v| v.as_str()))?;
    let message = message.trim();
    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}
