use serde_json::{json, Value};

use crate::json::{array_field, str_field};
use crate::registry::{ParserState, TranslateContext};
use crate::sse;
use crate::usage::TokenUsage;

#[derive(Default)]
struct PendingToolCall {
    call_id: String,
    name: String,
    arguments: String,
    output_index: i64,
}

/// Cross-chunk state for chat chunks -> Responses SSE events. Text and
/// tool-call argument fragments accumulate so the `.done` events and the
/// final `response.completed` carry the assembled values.
#[derive(Default)]
pub struct ResponsesStreamState {
    created_emitted: bool,
    sequence: i64,
    response_id: String,
    model: String,
    text: String,
    text_output_index: Option<i64>,
    next_output_index: i64,
    tool_calls: Vec<PendingToolCall>,
    usage: Option<TokenUsage>,
}

impl ResponsesStreamState {
    fn next_seq(&mut self) -> i64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }
}

/// The Responses terminator is `response.completed`; no `[DONE]` frame is
/// forwarded.
pub fn transform_stream(
    ctx: &TranslateContext<'_>,
    chunk: &str,
    state: &mut ParserState,
) -> Vec<String> {
    let state = state.get_or_default::<ResponsesStreamState>();

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

    if !state.created_emitted {
        state.created_emitted = true;
        state.response_id = str_field(&parsed, "id").unwrap_or("resp_unknown").to_string();
        state.model = str_field(&parsed, "model").unwrap_or(ctx.model).to_string();
        let seq = state.next_seq();
        frames.push(sse::event_frame(
            "response.created",
            &json!({
                "type": "response.created",
                "sequence_number": seq,
                "response": {
                    "id": state.response_id,
                    "object": "response",
                    "status": "in_progress",
                    "model": state.model,
                    "output": [],
                },
            }),
        ));
    }

    if let Some(detail) = crate::usage::openai_usage(&parsed) {
        state.usage = Some(detail);
    }

    let Some(choice) = array_field(&parsed, "choices").and_then(<[Value]>::first) else {
        return frames;
    };
    let Some(delta) = choice.get("delta") else {
        return frames;
    };

    if let Some(text) = str_field(delta, "content") {
        if !text.is_empty() {
            let output_index = match state.text_output_index {
                Some(index) => index,
                None => {
                    let index = state.next_output_index;
                    state.next_output_index += 1;
                    state.text_output_index = Some(index);
                    index
                }
            };
            state.text.push_str(text);
            let seq = state.next_seq();
            frames.push(sse::event_frame(
                "response.output_text.delta",
                &json!({
                    "type": "response.output_text.delta",
                    "item_id": format!("msg_{}", state.response_id),
                    "output_index": output_index,
                    "content_index": 0,
                    "delta": text,
                    "sequence_number": seq,
                }),
            ));
        }
    }

    if let Some(tool_calls) = array_field(delta, "tool_calls") {
        for call in tool_calls {
            append_tool_call(state, call, &mut frames);
        }
    }

    frames
}

fn append_tool_call(state: &mut ResponsesStreamState, call: &Value, frames: &mut Vec<String>) {
    let function = call.get("function");
    let id = str_field(call, "id");
    let name = function.and_then(|f| str_field(f, "name"));

    if id.is_some() || name.is_some() || state.tool_calls.is_empty() {
        let output_index = state.next_output_index;
        state.next_output_index += 1;
        state.tool_calls.push(PendingToolCall {
            call_id: id.unwrap_or("").to_string(),
            name: name.unwrap_or("").to_string(),
            arguments: String::new(),
            output_index,
        });
    }

    let Some(pending) = state.tool_calls.last_mut() else {
        return;
    };
    if let Some(arguments) = function.and_then(|f| str_field(f, "arguments")) {
        if !arguments.is_empty() {
            pending.arguments.push_str(arguments);
            let frame = json!({
                "type": "response.function_call_arguments.delta",
                "item_id": pending.call_id,
                "output_index": pending.output_index,
                "delta": arguments,
            });
            let seq = state.next_seq();
            let mut frame = frame;
            frame["sequence_number"] = json!(seq);
            frames.push(sse::event_frame("response.function_call_arguments.delta", &frame));
        }
    }
}

fn finish(state: &mut ResponsesStreamState) -> Vec<String> {
    let mut frames = Vec::new();
    let mut output = Vec::new();

    if !state.text.is_empty() {
        let output_index = state.text_output_index.unwrap_or(0);
        let seq = state.next_seq();
        frames.push(sse::event_frame(
            "response.output_text.done",
            &json!({
                "type": "response.output_text.done",
                "item_id": format!("msg_{}", state.response_id),
                "output_index": output_index,
                "content_index": 0,
                "text": state.text,
                "sequence_number": seq,
            }),
        ));
        output.push(json!({
            "type": "message",
            "id": format!("msg_{}", state.response_id),
            "role": "assistant",
            "status": "completed",
            "content": [{"type": "output_text", "text": state.text, "annotations": []}],
        }));
    }

    for call in &state.tool_calls {
        output.push(json!({
            "type": "function_call",
            "id": call.call_id,
            "call_id": call.call_id,
            "name": call.name,
            "arguments": call.arguments,
            "status": "completed",
        }));
    }
    for index in 0..state.tool_calls.len() {
        let (item_id, output_index, name, arguments) = {
            let call = &state.tool_calls[index];
            (
                call.call_id.clone(),
                call.output_index,
                call.name.clone(),
                call.arguments.clone(),
            )
        };
        let seq = state.next_seq();
        frames.push(sse::event_frame(
            "response.function_call_arguments.done",
            &json!({
                "type": "response.function_call_arguments.done",
                "item_id": item_id,
                "output_index": output_index,
                "name": name,
                "arguments": arguments,
                "sequence_number": seq,
            }),
        ));
    }

    let mut response = json!({
        "id": state.response_id,
        "object": "response",
        "status": "completed",
        "model": state.model,
        "output": output,
    });
    if let Some(detail) = state.usage {
        response["usage"] = json!({
            "input_tokens": detail.prompt_tokens,
            "output_tokens": detail.completion_tokens,
            "total_tokens": detail.total_tokens,
        });
    }
    let seq = state.next_seq();
    frames.push(sse::event_frame(
        "response.completed",
        &json!({
            "type": "response.completed",
            "sequence_number": seq,
            "response": response,
        }),
    ));
    frames
}
