use serde_json::{json, Map, Value};

use crate::json::{array_field, str_field};
use crate::registry::{ParserState, TranslateContext};
use crate::usage;

/// Converts a unary chat completion response into a Gemini
/// generateContent response.
pub fn transform_response(
    _ctx: &TranslateContext<'_>,
    payload: &Value,
    _state: &mut ParserState,
) -> Value {
    if !payload.is_object() {
        return payload.clone();
    }
    let Some(choices) = array_field(payload, "choices") else {
        return payload.clone();
    };

    let mut parts = Vec::new();
    let mut finish_reason = "STOP";

    if let Some(choice) = choices.first() {
        if let Some(message) = choice.get("message") {
            if let Some(text) = str_field(message, "content") {
                if !text.is_empty() {
                    parts.push(json!({"text": text}));
                }
            }
            if let Some(tool_calls) = array_field(message, "tool_calls") {
                for call in tool_calls {
                    parts.push(function_call_part(call));
                }
            }
        }
        if let Some(finish) = str_field(choice, "finish_reason") {
            finish_reason = map_finish_reason(finish);
        }
    }

    let mut out = Map::new();
    out.insert(
        "candidates".to_string(),
        json!([{
            "content": {"parts": parts, "role": "model"},
            "finishReason": finish_reason,
            "index": 0,
        }]),
    );
    if let Some(detail) = usage::openai_usage(payload) {
        out.insert(
            "usageMetadata".to_string(),
            json!({
                "promptTokenCount": detail.prompt_tokens,
                "candidatesTokenCount": detail.completion_tokens,
                "totalTokenCount": detail.total_tokens,
            }),
        );
    }
    out.insert("modelVersion".to_string(), json!(str_field(payload, "model").unwrap_or("")));
    Value::Object(out)
}

pub(super) fn function_call_part(call: &Value) -> Value {
    let function = call.get("function");
    let name = function.and_then(|f| str_field(f, "name")).unwrap_or("");
    let arguments = function
        .and_then(|f| str_field(f, "arguments"))
        .unwrap_or("{}");
    let args: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
    json!({"functionCall": {"name": name, "args": args}})
}

pub(super) fn map_finish_reason(finish_reason: &str) -> &'static str {
    match finish_reason {
        "length" => "MAX_TOKENS",
        "content_filter" => "SAFETY",
        _ => "STOP",
    }
}
