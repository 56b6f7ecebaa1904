use std::collections::HashMap;

use proxy_accounts::{SignatureLookup, ThinkingSignatureCache};
use proxy_core::types::CanonicalRequest;
use proxy_gemini::models::{GenerateContentRequest, Part};
use sha2::{Digest, Sha256};

use crate::endpoints::is_claude_thinking_model;

const USER_AGENT: &str = "antigravity/0.1.0";
const API_CLIENT: &str = "gl-rust/antigravity-proxy";

/// Written into `thoughtSignature` when the cache has nothing fresh for the
/// replayed thinking text; tells the upstream to skip signature validation
/// for this part rather than reject it for a missing signature.
const SKIP_SIGNATURE_VALIDATION: &str = "skip_validation";

/// The assembled upstream envelope and header set for one dispatch attempt.
pub struct BuiltRequest {
    pub body: serde_json::Value,
    pub headers: HashMap<String, String>,
}

/// Stable digest of the first user-role message, used as the upstream
/// `sessionId`. Identical across every retry of the same conversation so
/// upstream prompt caching keyed on session id still hits; an empty or
/// missing first user message falls back to hashing an empty string, which
/// still yields a stable (if degenerate) id rather than a new one per retry.
pub fn session_id(req: &CanonicalRequest) -> String {
    let first_user_text = req
        .messages
        .iter()
        .find(|m| m.role == proxy_core::types::Role::User)
        .map(|m| {
            m.content
                .iter()
                .filter_map(|block| block.as_text())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(first_user_text.as_bytes());
    hex::encode(hasher.finalize())
}

fn request_id() -> String {
    format!("agent-{}", uuid::Uuid::new_v4())
}

/// Assemble the upstream JSON envelope and header map for `req` against
/// `project`, authenticated as `access_token`. Thinking parts whose
/// `thoughtSignature` a client has stripped are re-attached from `signatures`
/// when a fresh cache entry exists for their content digest.
pub fn build(
    req: &CanonicalRequest,
    project: &str,
    access_token: &str,
    streaming: bool,
    signatures: &ThinkingSignatureCache,
) -> BuiltRequest {
    let mut google_request: GenerateContentRequest = proxy_gemini::anthropic_to_google(req);
    reattach_signatures(&mut google_request, signatures);

    let body = serde_json::json!({
        "project": project,
        "model": req.model,
        "userAgent": USER_AGENT,
        "requestType": "agent",
        "requestId": request_id(),
        "request": {
            "contents": google_request.contents,
            "systemInstruction": google_request.system_instruction,
            "tools": google_request.tools,
            "generationConfig": google_request.generation_config,
            "sessionId": session_id(req),
        },
    });

    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), format!("Bearer {access_token}"));
    headers.insert("User-Agent".to_string(), USER_AGENT.to_string());
    headers.insert("X-Goog-Api-Client".to_string(), API_CLIENT.to_string());
    headers.insert(
        "Client-Metadata".to_string(),
        serde_json::json!({ "ideType": "IDE_UNSPECIFIED", "platform": "PLATFORM_UNSPECIFIED", "pluginType": "GEMINI" })
            .to_string(),
    );
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    if streaming {
        headers.insert("Accept".to_string(), "text/event-stream".to_string());
    }
    if is_claude_thinking_model(&req.model) {
        headers.insert("anthropic-beta".to_string(), "interleaved-thinking-2025-05-14".to_string());
    }

    BuiltRequest { body, headers }
}

fn reattach_signatures(google_request: &mut GenerateContentRequest, signatures: &ThinkingSignatureCache) {
    for content in &mut google_request.contents {
        for part in &mut content.parts {
            if let Part::Text { text, thought: Some(true), thought_signature } = part {
                if thought_signature.is_none() {
                    match signatures.lookup(text) {
                        SignatureLookup::Signature(signature) => *thought_signature = Some(signature),
                        SignatureLookup::Skip => *thought_signature = Some(SKIP_SIGNATURE_VALIDATION.to_string()),
                    }
                }
            }
        }
    }
}

/// Record every `thoughtSignature` observed in an upstream response so a
/// later request that replays the same thinking text (stripped of its
/// signature by the client) can have it re-attached by [`build`].
pub fn record_signatures(response: &proxy_gemini::models::GenerateContentResponse, signatures: &ThinkingSignatureCache) {
    for candidate in &response.candidates {
        for part in &candidate.content.parts {
            if let Part::Text { text, thought: Some(true), thought_signature: Some(signature) } = part {
                signatures.record(text, signature.clone());
            }
        }
    }
}
