//! SSE Stream Adapter.
//!
//! Reconstructs Anthropic-shaped canonical streaming events
//! (`proxy_core::StreamEvent`) from a sequence of upstream
//! `GenerateContentResponse` fragments. The adapter itself is a pure state
//! machine (`SseAdapter::ingest`/`finish`) so it can be exercised without a
//! network; [`drive`] wraps it around a live SSE byte stream.

use futures::{Stream, StreamExt};
use proxy_core::events::{BlockKind, Delta};
use proxy_core::StreamEvent;

use crate::models::{FinishReason, GenerateContentResponse, Part};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
    ToolUse,
}

impl From<OpenBlock> for BlockKind {
    fn from(value: OpenBlock) -> Self {
        match value {
            OpenBlock::Text => BlockKind::Text,
            OpenBlock::Thinking => BlockKind::Thinking,
            OpenBlock::ToolUse => BlockKind::ToolUse,
        }
    }
}

/// Stateful reconstruction of block boundaries across a sequence of fragments.
///
/// Invariant maintained across every call to `ingest`/`finish`: every opened
/// block is stopped before the next block opens, and indices are monotone
/// from zero.
#[derive(Debug, Default)]
pub struct SseAdapter {
    next_index: u32,
    open: Option<(u32, OpenBlock)>,
    started: bool,
    bytes_emitted: bool,
    last_finish_reason: Option<FinishReason>,
    output_tokens: u32,
    tool_call_counter: u32,
}

impl SseAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the stream has produced no text, thinking, or tool content so far.
    pub fn is_empty(&self) -> bool {
        !self.bytes_emitted
    }

    fn open_block(&mut self, kind: OpenBlock, events: &mut Vec<StreamEvent>) -> u32 {
        if let Some((index, existing)) = self.open {
            if existing == kind {
                return index;
            }
            events.push(StreamEvent::ContentBlockStop { index });
            self.open = None;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.open = Some((index, kind));
        events.push(StreamEvent::ContentBlockStart { index, block_kind: kind.into() });
        index
    }

    fn close_open_block(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some((index, _)) = self.open.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
    }

    /// Process one upstream fragment, returning the canonical events it produces.
    pub fn ingest(&mut self, fragment: &GenerateContentResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            events.push(StreamEvent::MessageStart {
                input_tokens: fragment.usage_metadata.prompt_token_count,
            });
        }

        if fragment.usage_metadata.candidates_token_count > 0 {
            self.output_tokens = fragment.usage_metadata.candidates_token_count;
        }

        let Some(candidate) = fragment.candidates.first() else { return events };
        if let Some(reason) = candidate.finish_reason {
            if reason != FinishReason::FinishReasonUnspecified {
                self.last_finish_reason = Some(reason);
            }
        }

        for part in &candidate.content.parts {
            match part {
                Part::Text { text, thought: Some(true), thought_signature } => {
                    let index = self.open_block(OpenBlock::Thinking, &mut events);
                    if !text.is_empty() {
                        self.bytes_emitted = true;
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: Delta::ThinkingDelta { thinking: text.clone() },
                        });
                    }
                    if let Some(signature) = thought_signature {
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: Delta::SignatureDelta { signature: signature.clone() },
                        });
                    }
                }
                Part::Text { text, .. } => {
                    let index = self.open_block(OpenBlock::Text, &mut events);
                    self.bytes_emitted = true;
                    events.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: Delta::TextDelta { text: text.clone() },
                    });
                }
                Part::FunctionCall { function_call, .. } => {
                    self.close_open_block(&mut events);
                    let index = self.open_block(OpenBlock::ToolUse, &mut events);
                    self.bytes_emitted = true;
                    let partial_json = serde_json::to_string(&function_call.args).unwrap_or_default();
                    events.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: Delta::InputJsonDelta { partial_json },
                    });
                    self.close_open_block(&mut events);
                    self.tool_call_counter += 1;
                }
                Part::FunctionResponse { .. } | Part::Unknown => {
                    // Unknown/unsupported part kind: never abort the stream.
                    if let Some((index, _)) = self.open {
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: Delta::TextDelta { text: String::new() },
                        });
                    }
                }
            }
        }

        events
    }

    /// Finalize the stream: close any open block and emit `message_delta` + `message_stop`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.close_open_block(&mut events);

        let stop_reason = translate_stop_reason(self.last_finish_reason, self.tool_call_counter > 0);
        events.push(StreamEvent::MessageDelta { stop_reason, output_tokens: self.output_tokens });
        events.push(StreamEvent::MessageStop);
        events
    }

    /// Emit the terminal error event for an upstream disconnect mid-stream.
    pub fn disconnect(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.close_open_block(&mut events);
        events.push(StreamEvent::Error {
            kind: "upstream_disconnect".into(),
            message: "upstream connection closed before the stream completed".into(),
        });
        events
    }
}

fn translate_stop_reason(
    reason: Option<FinishReason>,
    saw_tool_call: bool,
) -> proxy_core::StopReason {
    use proxy_core::StopReason;
    if saw_tool_call {
        return StopReason::ToolUse;
    }
    match reason {
        Some(FinishReason::MaxTokens) => StopReason::MaxTokens,
        Some(FinishReason::Safety) => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

/// Drive an [`SseAdapter`] over a live upstream SSE byte stream, yielding
/// canonical events as fragments arrive. Never buffers a whole message: each
/// `data:` line is parsed and forwarded as soon as it is received.
pub fn drive<S, E>(mut adapter: SseAdapter, source: S) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = Result<eventsource_stream::Event, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(source);
        let mut disconnected = false;
        loop {
            match source.next().await {
                Some(Ok(event)) => {
                    if event.data == "[DONE]" {
                        break;
                    }
                    match serde_json::from_str::<GenerateContentResponse>(&event.data) {
                        Ok(fragment) => {
                            for e in adapter.ingest(&fragment) {
                                yield e;
                            }
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "unparsable upstream fragment, skipping");
                        }
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "upstream stream error");
                    disconnected = true;
                    break;
                }
                None => break,
            }
        }

        if disconnected && adapter.is_empty() {
            for e in adapter.disconnect() {
                yield e;
            }
        } else {
            for e in adapter.finish() {
                yield e;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, Content, Role, UsageMetadata};

    fn fragment(parts: Vec<Part>, finish_reason: Option<FinishReason>) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate { content: Content::new(Role::Model, parts), finish_reason }],
            usage_metadata: UsageMetadata::default(),
        }
    }

    #[test]
    fn first_fragment_emits_message_start() {
        let mut adapter = SseAdapter::new();
        let events = adapter.ingest(&fragment(vec![Part::text("hi")], None));
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
    }

    #[test]
    fn consecutive_text_parts_share_one_block() {
        let mut adapter = SseAdapter::new();
        adapter.ingest(&fragment(vec![Part::text("hello ")], None));
        let events = adapter.ingest(&fragment(vec![Part::text("world")], None));
        assert!(matches!(events[0], StreamEvent::ContentBlockDelta { index: 0, .. }));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn switching_from_text_to_thinking_closes_and_reopens() {
        let mut adapter = SseAdapter::new();
        adapter.ingest(&fragment(vec![Part::text("hello")], None));
        let events = adapter.ingest(&fragment(vec![Part::thought("pondering", None)], None));
        assert!(matches!(events[0], StreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(events[1], StreamEvent::ContentBlockStart { index: 1, block_kind: BlockKind::Thinking }));
    }

    #[test]
    fn function_call_opens_and_closes_its_own_block() {
        let mut adapter = SseAdapter::new();
        let events = adapter.ingest(&fragment(
            vec![Part::function_call("search", serde_json::json!({"q": 1}), None)],
            None,
        ));
        assert!(matches!(events[1], StreamEvent::ContentBlockStart { block_kind: BlockKind::ToolUse, .. }));
        assert!(matches!(events[3], StreamEvent::ContentBlockStop { .. }));
    }

    #[test]
    fn full_scenario_matches_expected_event_sequence() {
        let mut adapter = SseAdapter::new();
        let mut events = Vec::new();
        events.extend(adapter.ingest(&fragment(vec![Part::text("hello ")], None)));
        events.extend(adapter.ingest(&fragment(vec![Part::text("world")], None)));
        events.extend(adapter.ingest(&fragment(vec![Part::thought("…", None)], None)));
        events.extend(adapter.ingest(&fragment(
            vec![Part::function_call("q", serde_json::json!({"q": 1}), None)],
            Some(FinishReason::Stop),
        )));
        events.extend(adapter.finish());

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                StreamEvent::MessageStart { .. } => "message_start",
                StreamEvent::ContentBlockStart { .. } => "content_block_start",
                StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
                StreamEvent::ContentBlockStop { .. } => "content_block_stop",
                StreamEvent::MessageDelta { .. } => "message_delta",
                StreamEvent::MessageStop => "message_stop",
                StreamEvent::Error { .. } => "error",
            })
            .collect();

        assert_eq!(
            kinds,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(events.last(), Some(&StreamEvent::MessageStop));
    }

    #[test]
    fn empty_stream_is_detected() {
        let mut adapter = SseAdapter::new();
        adapter.ingest(&GenerateContentResponse::default());
        assert!(adapter.is_empty());
    }

    #[test]
    fn stream_with_text_is_not_empty() {
        let mut adapter = SseAdapter::new();
        adapter.ingest(&fragment(vec![Part::text("hi")], None));
        assert!(!adapter.is_empty());
    }

    #[test]
    fn disconnect_closes_open_block_and_emits_terminal_error() {
        let mut adapter = SseAdapter::new();
        adapter.ingest(&fragment(vec![Part::text("partial")], None));
        let events = adapter.disconnect();
        assert!(matches!(events[0], StreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(events[1], StreamEvent::Error { .. }));
    }
}
