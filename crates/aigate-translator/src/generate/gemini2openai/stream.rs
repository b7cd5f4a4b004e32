use serde_json::{json, Value};

use crate::json::{array_field, str_field};
use crate::registry::{ParserState, TranslateContext};
use crate::sse;
use crate::usage::TokenUsage;

use super::response::map_finish_reason;

#[derive(Default)]
struct PendingFunctionCall {
    name: String,
    arguments: String,
}

/// Cross-chunk state for chat chunks -> Gemini stream frames. Text deltas
/// forward immediately; function-call arguments accumulate until the end of
/// the stream because Gemini parts carry complete `args` objects.
#[derive(Default)]
pub struct GeminiStreamState {
    calls: Vec<PendingFunctionCall>,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
    tail_emitted: bool,
}

/// Gemini streams have no terminator frame; `[DONE]` only flushes the
/// buffered function calls and the final finishReason/usage frame.
pub fn transform_stream(
    _ctx: &TranslateContext<'_>,
    chunk: &str,
    state: &mut ParserState,
) -> Vec<String> {
    let state = state.get_or_default::<GeminiStreamState>();

    if sse::is_done(chunk) {
        return finish(state);
    }
    let Some(payload) = sse::data_payload(chunk) else {
        return Vec::new();
    };
    let Ok(parsed) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    if let Some(detail) = crate::usage::openai_usage(&parsed) {
        state.usage = Some(detail);
    }

    let mut frames = Vec::new();
    let Some(choice) = array_field(&parsed, "choices").and_then(<[Value]>::first) else {
        return frames;
    };

    if let Some(delta) = choice.get("delta") {
        if let Some(text) = str_field(delta, "content") {
            if !text.is_empty() {
                frames.push(sse::data_frame(&json!({
                    "candidates": [{
                        "content": {"parts": [{"text": text}], "role": "model"},
                        "index": 0,
                    }],
                })));
            }
        }
        if let Some(tool_calls) = array_field(delta, "tool_calls") {
            for call in tool_calls {
                let function = call.get("function");
                let name = function.and_then(|f| str_field(f, "name"));
                if name.is_some() || state.calls.is_empty() {
                    state.calls.push(PendingFunctionCall {
                        name: name.unwrap_or("").to_string(),
                        arguments: String::new(),
                    });
                }
                if let Some(arguments) = function.and_then(|f| str_field(f, "arguments")) {
                    if let Some(pending) = state.calls.last_mut() {
                        pending.arguments.push_str(arguments);
                    }
                }
            }
        }
    }

    if let Some(finish) = str_field(choice, "finish_reason") {
        state.finish_reason = Some(map_finish_reason(finish).to_string());
    }

    frames
}

fn finish(state: &mut GeminiStreamState) -> Vec<String> {
    if state.tail_emitted {
        return Vec::new();
    }
    state.tail_emitted = true;

    let mut parts = Vec::new();
    for call in &state.calls {
        let args: Value = serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));
        parts.push(json!({"functionCall": {"name": call.name, "args": args}}));
    }

    let finish_reason = state.finish_reason.clone().unwrap_or_else(|| "STOP".to_string());
    let mut tail = json!({
        "candidates": [{
            "content": {"parts": parts, "role": "model"},
            "finishReason": finish_reason,
            "index": 0,
        }],
    });
    if let Some(detail) = state.usage {
        tail["usageMetadata"] = json!({
            "promptTokenCount": detail.prompt_tokens,
            "candidatesTokenCount": detail.completion_tokens,
            "totalTokenCount": detail.total_tokens,
        });
    }
    vec![sse::data_frame(&tail)]
}
