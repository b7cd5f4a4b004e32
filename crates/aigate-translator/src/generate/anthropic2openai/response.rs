use serde_json::{json, Map, Value};

use crate::json::{array_field, str_field};
use crate::registry::{ParserState, TranslateContext};
use crate::usage;

/// Converts a unary OpenAI chat completion response into an Anthropic
/// message. Unparseable payloads pass through unchanged.
pub fn transform_response(
    ctx: &TranslateContext<'_>,
    payload: &Value,
    _state: &mut ParserState,
) -> Value {
    if !payload.is_object() {
        return payload.clone();
    }
    let Some(choices) = array_field(payload, "choices") else {
        return payload.clone();
    };

    let mut content = Vec::new();
    let mut stop_reason = "end_turn";

    if let Some(choice) = choices.first() {
        if let Some(message) = choice.get("message") {
            if let Some(reasoning) = str_field(message, "reasoning_content") {
                if !reasoning.is_empty() {
                    content.push(json!({
                        "type": "thinking",
                        "thinking": reasoning,
                        "signature": "",
                    }));
                }
            }
            if let Some(text) = str_field(message, "content") {
                if !text.is_empty() {
                    content.push(json!({"type": "text", "text": text}));
                }
            }
            if let Some(tool_calls) = array_field(message, "tool_calls") {
                for call in tool_calls {
                    content.push(map_tool_call(call));
                }
            }
        }
        if let Some(finish) = str_field(choice, "finish_reason") {
            stop_reason = map_stop_reason(finish);
        }
    }

    let usage = usage::openai_usage(payload).unwrap_or_default();

    let mut out = Map::new();
    out.insert(
        "id".to_string(),
        json!(str_field(payload, "id").unwrap_or("msg_unknown")),
    );
    out.insert("type".to_string(), json!("message"));
    out.insert("role".to_string(), json!("assistant"));
    out.insert(
        "model".to_string(),
        json!(str_field(payload, "model").unwrap_or(ctx.model)),
    );
    out.insert("content".to_string(), Value::Array(content));
    out.insert("stop_reason".to_string(), json!(stop_reason));
    out.insert("stop_sequence".to_string(), Value::Null);
    out.insert(
        "usage".to_string(),
        json!({
            "input_tokens": usage.prompt_tokens,
            "output_tokens": usage.completion_tokens,
        }),
    );
    Value::Object(out)
}

fn map_tool_call(call: &Value) -> Value {
    let function = call.get("function");
    let arguments = function
        .and_then(|f| str_field(f, "arguments"))
        .unwrap_or("{}");
    let input: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
    json!({
        "type": "tool_use",
        "id": str_field(call, "id").unwrap_or(""),
        "name": function.and_then(|f| str_field(f, "name")).unwrap_or(""),
        "input": input,
    })
}

pub(super) fn map_stop_reason(finish_reason: &str) -> &'static str {
    match finish_reason {
        "length" => "max_tokens",
        "tool_calls" | "function_call" => "tool_use",
        _ => "end_turn",
    }
}
