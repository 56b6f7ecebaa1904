/// Ordered upstream hosts tried for every dispatch attempt: the daily
/// pre-production host first, then production. Both speak the identical
/// `v1internal:generateContent` / `v1internal:streamGenerateContent` protocol.
pub const ENDPOINTS: &[&str] = &[
    "https://daily-cloudcode-pa.googleapis.com",
    "https://cloudcode-pa.googleapis.com",
];

pub const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const PROJECT_DISCOVERY_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal:loadCodeAssist";

/// Static cross-family fallback used when a model's entire account pool is
/// exhausted. The hop is attempted at most once per original request.
pub fn fallback_model(model: &str) -> Option<&'static str> {
    match model {
        "claude-opus-4-1-20250805" | "claude-sonnet-4-5-20250929" => Some("gemini-3-pro"),
        "gemini-3-pro" | "gemini-3-flash" => Some("claude-sonnet-4-5-20250929"),
        _ => None,
    }
}

/// Models whose thinking output requires SSE transport rather than a plain
/// JSON response, regardless of family.
pub fn is_thinking_capable(model: &str) -> bool {
    model.starts_with("claude-opus-4") || model.starts_with("claude-sonnet-4") || model.starts_with("gemini-3")
}

/// Claude-family thinking models only: these are the ones the upstream
/// expects the `anthropic-beta: interleaved-thinking` header for. Gemini
/// models never take this header even though they share the SSE transport.
pub fn is_claude_thinking_model(model: &str) -> bool {
    model.starts_with("claude-opus-4") || model.starts_with("claude-sonnet-4")
}
