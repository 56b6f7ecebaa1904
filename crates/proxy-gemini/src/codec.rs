//! Pure, stateless translation between the canonical Anthropic-shaped
//! message schema (`proxy_core::types`) and the Google generateContent wire
//! schema (`crate::models`), in both directions.

use std::collections::HashMap;

use proxy_core::{CanonicalRequest, CanonicalResponse, ContentBlock, Role, StopReason, Usage};

use crate::identity::IDENTITY_PREAMBLE;
use crate::models::{
    Candidate, Content, FinishReason, FunctionDeclaration, GenerateContentRequest,
    GenerateContentResponse, GenerationConfig, Part, Role as GoogleRole, ThinkingConfig, Tool,
};

/// Gemini rejects `maxOutputTokens` above this ceiling.
pub const GEMINI_MAX_OUTPUT_TOKENS: u32 = 16_384;

/// Translate a canonical request into the upstream generateContent envelope.
///
/// The system instruction is always the identity preamble, with any
/// caller-supplied system text appended; tool_use/tool_result ids are
/// resolved against the preceding assistant message so a `functionResponse`
/// can recover the function name, which Anthropic's `tool_result` shape does
/// not carry directly.
pub fn anthropic_to_google(req: &CanonicalRequest) -> GenerateContentRequest {
    let mut tool_id_to_name: HashMap<String, String> = HashMap::new();
    let mut contents = Vec::with_capacity(req.messages.len());

    for message in &req.messages {
        if message.role == Role::Assistant {
            for block in &message.content {
                if let ContentBlock::ToolUse { id, name, .. } = block {
                    tool_id_to_name.insert(id.clone(), name.clone());
                }
            }
        }

        let role = match message.role {
            Role::User => GoogleRole::User,
            Role::Assistant => GoogleRole::Model,
        };

        let mut parts = Vec::with_capacity(message.content.len());
        for block in &message.content {
            if let Some(part) = translate_block_out(block, &tool_id_to_name) {
                parts.push(part);
            }
        }
        if parts.is_empty() {
            parts.push(Part::text(" "));
        }

        contents.push(Content::new(role, parts));
    }

    let system_text = match &req.system {
        Some(text) if !text.is_empty() => format!("{IDENTITY_PREAMBLE}\n\n{text}"),
        _ => IDENTITY_PREAMBLE.to_string(),
    };

    let tools = if req.tools.is_empty() {
        Vec::new()
    } else {
        vec![Tool {
            function_declarations: req
                .tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                })
                .collect(),
        }]
    };

    GenerateContentRequest {
        contents,
        system_instruction: Some(Content::new(GoogleRole::User, vec![Part::text(system_text)])),
        tools,
        generation_config: GenerationConfig {
            max_output_tokens: Some(req.max_tokens.min(GEMINI_MAX_OUTPUT_TOKENS)),
            thinking_config: req.thinking.then(|| ThinkingConfig { include_thoughts: true }),
        },
    }
}

fn translate_block_out(block: &ContentBlock, tool_id_to_name: &HashMap<String, String>) -> Option<Part> {
    match block {
        ContentBlock::Text { text } => Some(Part::text(text.clone())),
        ContentBlock::Thinking { thinking, signature } => Some(Part::thought(thinking.clone(), signature.clone())),
        ContentBlock::ToolUse { name, input, .. } => Some(Part::function_call(name.clone(), input.clone(), None)),
        ContentBlock::ToolResult { tool_use_id, content, .. } => {
            let name = tool_id_to_name.get(tool_use_id).cloned().unwrap_or_else(|| tool_use_id.clone());
            Some(Part::function_response(name, serde_json::json!({ "output": content })))
        }
    }
}

/// Translate a complete (non-streamed) upstream response into the canonical
/// shape, merging adjacent plain-text parts and synthesizing stable
/// `tool_use` ids for function calls (upstream does not supply any).
pub fn google_to_anthropic(resp: &GenerateContentResponse) -> CanonicalResponse {
    let candidate = resp.candidates.first().cloned().unwrap_or_default();
    let mut content = translate_candidate(&candidate);
    let stop_reason = translate_finish_reason(candidate.finish_reason.unwrap_or_default(), &content);

    if candidate.finish_reason == Some(FinishReason::Safety) {
        content.push(ContentBlock::text("[response blocked by safety filter]"));
    }

    CanonicalResponse {
        content,
        stop_reason,
        usage: Usage {
            input_tokens: resp.usage_metadata.prompt_token_count,
            output_tokens: resp.usage_metadata.candidates_token_count,
        },
    }
}

fn translate_candidate(candidate: &Candidate) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    let mut pending_text = String::new();
    let mut tool_call_index = 0u32;

    for part in &candidate.content.parts {
        match part {
            Part::Text { text, thought: Some(true), thought_signature } => {
                flush_text(&mut pending_text, &mut blocks);
                blocks.push(ContentBlock::thinking(text.clone(), thought_signature.clone()));
            }
            Part::Text { text, .. } => pending_text.push_str(text),
            Part::FunctionCall { function_call, .. } => {
                flush_text(&mut pending_text, &mut blocks);
                let id = format!("call_{tool_call_index:x}");
                tool_call_index += 1;
                blocks.push(ContentBlock::tool_use(id, function_call.name.clone(), function_call.args.clone()));
            }
            Part::FunctionResponse { .. } | Part::Unknown => {
                // Never observed from upstream in a model-role candidate; treated as an
                // empty text delta rather than failing the whole response.
            }
        }
    }
    flush_text(&mut pending_text, &mut blocks);
    blocks
}

fn flush_text(pending: &mut String, blocks: &mut Vec<ContentBlock>) {
    if !pending.is_empty() {
        blocks.push(ContentBlock::text(std::mem::take(pending)));
    }
}

fn translate_finish_reason(reason: FinishReason, content: &[ContentBlock]) -> StopReason {
    if content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. })) {
        return StopReason::ToolUse;
    }
    match reason {
        FinishReason::MaxTokens => StopReason::MaxTokens,
        FinishReason::Safety => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}
