use serde_json::{json, Value};

use crate::json::{array_field, i64_field, str_field};
use crate::registry::{ParserState, TranslateContext};
use crate::sse;
use crate::usage::TokenUsage;

use super::response::map_stop_reason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
    Tool,
}

/// Cross-chunk state for OpenAI chat chunks -> Anthropic SSE events.
/// Content blocks open and close as the delta kind changes; stop reason and
/// usage are buffered until the terminal sentinel arrives.
#[derive(Default)]
pub struct AnthropicStreamState {
    message_started: bool,
    block: Option<OpenBlock>,
    block_index: i64,
    stop_reason: Option<String>,
    usage: Option<TokenUsage>,
    message_id: String,
    model: String,
}

/// Translates one upstream SSE line. `[DONE]` flushes the buffered
/// message_delta and emits `message_stop`, the Anthropic terminator.
pub fn transform_stream(
    ctx: &TranslateContext<'_>,
    chunk: &str,
    state: &mut ParserState,
) -> Vec<String> {
    let state = state.get_or_default::<AnthropicStreamState>();

    if sse::is_done(chunk) {
        return finish(state);
    }
    let Some(payload) = sse::data_payload(chunk) else {
        return Vec::new();
    };
    let Ok(parsed) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    let mut frames = Vec::new();

    if !state.message_started {
        state.message_started = true;
        state.message_id = str_field(&parsed, "id").unwrap_or("msg_unknown").to_string();
        state.model = str_field(&parsed, "model").unwrap_or(ctx.model).to_string();
        frames.push(sse::event_frame(
            "message_start",
            &json!({
                "type": "message_start",
                "message": {
                    "id": state.message_id,
                    "type": "message",
                    "role": "assistant",
                    "model": state.model,
                    "content": [],
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": 0, "output_tokens": 0},
                }
            }),
        ));
        frames.push(sse::event_frame("ping", &json!({"type": "ping"})));
    }

    if let Some(detail) = chunk_usage(&parsed) {
        state.usage = Some(detail);
    }

    let Some(choice) = array_field(&parsed, "choices").and_then(<[Value]>::first) else {
        return frames;
    };

    if let Some(delta) = choice.get("delta") {
        if let Some(reasoning) = str_field(delta, "reasoning_content") {
            if !reasoning.is_empty() {
                ensure_block(state, OpenBlock::Thinking, &mut frames, None);
                frames.push(sse::event_frame(
                    "content_block_delta",
                    &json!({
                        "type": "content_block_delta",
                        "index": state.block_index,
                        "delta": {"type": "thinking_delta", "thinking": reasoning},
                    }),
                ));
            }
        }
        if let Some(text) = str_field(delta, "content") {
            if !text.is_empty() {
                ensure_block(state, OpenBlock::Text, &mut frames, None);
                frames.push(sse::event_frame(
                    "content_block_delta",
                    &json!({
                        "type": "content_block_delta",
                        "index": state.block_index,
                        "delta": {"type": "text_delta", "text": text},
                    }),
                ));
            }
        }
        if let Some(tool_calls) = array_field(delta, "tool_calls") {
            for call in tool_calls {
                append_tool_call(state, call, &mut frames);
            }
        }
    }

    if let Some(finish) = str_field(choice, "finish_reason") {
        state.stop_reason = Some(map_stop_reason(finish).to_string());
        close_block(state, &mut frames);
    }

    frames
}

fn ensure_block(
    state: &mut AnthropicStreamState,
    kind: OpenBlock,
    frames: &mut Vec<String>,
    start: Option<Value>,
) {
    if state.block == Some(kind) && start.is_none() {
        return;
    }
    close_block(state, frames);

    let content_block = start.unwrap_or_else(|| match kind {
        OpenBlock::Text => json!({"type": "text", "text": ""}),
        OpenBlock::Thinking => json!({"type": "thinking", "thinking": "", "signature": ""}),
        OpenBlock::Tool => json!({"type": "tool_use", "id": "", "name": "", "input": {}}),
    });

    frames.push(sse::event_frame(
        "content_block_start",
        &json!({
            "type": "content_block_start",
            "index": state.block_index,
            "content_block": content_block,
        }),
    ));
    state.block = Some(kind);
}

fn close_block(state: &mut AnthropicStreamState, frames: &mut Vec<String>) {
    if state.block.take().is_some() {
        frames.push(sse::event_frame(
            "content_block_stop",
            &json!({"type": "content_block_stop", "index": state.block_index}),
        ));
        state.block_index += 1;
    }
}

fn append_tool_call(state: &mut AnthropicStreamState, call: &Value, frames: &mut Vec<String>) {
    let function = call.get("function");
    let id = str_field(call, "id");
    let name = function.and_then(|f| str_field(f, "name"));

    // A chunk carrying id or name opens a new tool_use block; bare argument
    // fragments extend the current one.
    if id.is_some() || name.is_some() {
        let start = json!({
            "type": "tool_use",
            "id": id.unwrap_or(""),
            "name": name.unwrap_or(""),
            "input": {},
        });
        ensure_block(state, OpenBlock::Tool, frames, Some(start));
    } else if state.block != Some(OpenBlock::Tool) {
        ensure_block(state, OpenBlock::Tool, frames, None);
    }

    if let Some(arguments) = function.and_then(|f| str_field(f, "arguments")) {
        if !arguments.is_empty() {
            frames.push(sse::event_frame(
                "content_block_delta",
                &json!({
                    "type": "content_block_delta",
                    "index": state.block_index,
                    "delta": {"type": "input_json_delta", "partial_json": arguments},
                }),
            ));
        }
    }
}

fn finish(state: &mut AnthropicStreamState) -> Vec<String> {
    let mut frames = Vec::new();
    close_block(state, &mut frames);

    let usage = state.usage.unwrap_or_default();
    let stop_reason = state.stop_reason.clone().unwrap_or_else(|| "end_turn".to_string());
    frames.push(sse::event_frame(
        "message_delta",
        &json!({
            "type": "message_delta",
            "delta": {"stop_reason": stop_reason, "stop_sequence": null},
            "usage": {
                "input_tokens": usage.prompt_tokens,
                "output_tokens": usage.completion_tokens,
            },
        }),
    ));
    frames.push(sse::event_frame(
        "message_stop",
        &json!({"type": "message_stop"}),
    ));
    frames
}

fn chunk_usage(parsed: &Value) -> Option<TokenUsage> {
    let usage = parsed.get("usage")?;
    if !usage.is_object() {
        return None;
    }
    Some(TokenUsage::new(
        i64_field(usage, "prompt_tokens").unwrap_or(0),
        i64_field(usage, "completion_tokens").unwrap_or(0),
        i64_field(usage, "total_tokens").unwrap_or(0),
    ))
}
