use serde::{Deserialize, Serialize};

use crate::types::{StopReason, Usage};

/// The kind of content block a `content_block_start` opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// The payload of a `content_block_delta` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "delta_kind", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    InputJsonDelta { partial_json: String },
}

/// Canonical streaming event taxonomy, isomorphic to Anthropic's Messages SSE
/// events. The SSE Stream Adapter is the only producer; the Codec emits these
/// one at a time as upstream fragments arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart { input_tokens: u32 },
    ContentBlockStart { index: u32, block_kind: BlockKind },
    ContentBlockDelta { index: u32, delta: Delta },
    ContentBlockStop { index: u32 },
    MessageDelta { stop_reason: StopReason, output_tokens: u32 },
    MessageStop,
    Error { kind: String, message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::MessageStop | StreamEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_stop_is_terminal() {
        assert!(StreamEvent::MessageStop.is_terminal());
    }

    #[test]
    fn error_event_is_terminal() {
        let event = StreamEvent::Error { kind: "upstream_disconnect".into(), message: "closed".into() };
        assert!(event.is_terminal());
    }

    #[test]
    fn content_block_start_is_not_terminal() {
        let event = StreamEvent::ContentBlockStart { index: 0, block_kind: BlockKind::Text };
        assert!(!event.is_terminal());
    }

    #[test]
    fn delta_serializes_with_tag() {
        let delta = Delta::TextDelta { text: "hi".into() };
        let encoded = serde_json::to_value(&delta).unwrap();
        assert_eq!(encoded["delta_kind"], "text_delta");
        assert_eq!(encoded["text"], "hi");
    }
}
