//! Wire types for the upstream `v1internal:generateContent` /
//! `v1internal:streamGenerateContent` protocol.
//!
//! These mirror the JSON shapes the upstream backend actually sends and
//! receives; they are deliberately permissive (`#[serde(default)]` on every
//! optional field) because the daily and production endpoints vary slightly
//! in field casing and which optional fields they populate.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A content part that can appear in a `Content.parts` array.
///
/// `Text` is ordered first among the untagged variants that can overlap on
/// the `text` field, but `thought`/`thoughtSignature` are carried alongside
/// it rather than as a separate tagged variant, mirroring how the upstream
/// backend actually shapes a thinking part: a text part with `thought: true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought: Option<bool>,
        #[serde(rename = "thoughtSignature", default, skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
        #[serde(rename = "thoughtSignature", default, skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    /// Catch-all for part kinds this proxy does not understand (e.g. inline
    /// media). Never fails deserialization; surfaced as an empty text delta.
    #[serde(other)]
    Unknown,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into(), thought: None, thought_signature: None }
    }

    pub fn thought(text: impl Into<String>, signature: Option<String>) -> Self {
        Part::Text { text: text.into(), thought: Some(true), thought_signature: signature }
    }

    pub fn function_call(name: impl Into<String>, args: serde_json::Value, signature: Option<String>) -> Self {
        Part::FunctionCall {
            function_call: FunctionCall { name: name.into(), args },
            thought_signature: signature,
        }
    }

    pub fn function_response(name: impl Into<String>, response: serde_json::Value) -> Self {
        Part::FunctionResponse { function_response: FunctionResponse { name: name.into(), response } }
    }

    pub fn is_thought(&self) -> bool {
        matches!(self, Part::Text { thought: Some(true), .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role: Some(role), parts }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "functionDeclarations")]
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_thoughts: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    #[default]
    FinishReasonUnspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: UsageMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_part_round_trips() {
        let part = Part::text("hello");
        let encoded = serde_json::to_value(&part).unwrap();
        assert_eq!(encoded["text"], "hello");
        let decoded: Part = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, part);
    }

    #[test]
    fn thought_part_is_detected() {
        let part = Part::thought("reasoning...", Some("sig".into()));
        assert!(part.is_thought());
    }

    #[test]
    fn unknown_part_kind_does_not_fail_deserialization() {
        let json = serde_json::json!({"inlineData": {"mimeType": "image/png", "data": "..."}});
        let part: Part = serde_json::from_value(json).unwrap();
        assert_eq!(part, Part::Unknown);
    }

    #[test]
    fn generate_content_response_defaults_missing_fields() {
        let json = serde_json::json!({});
        let resp: GenerateContentResponse = serde_json::from_value(json).unwrap();
        assert!(resp.candidates.is_empty());
        assert_eq!(resp.usage_metadata.prompt_token_count, 0);
    }
}
