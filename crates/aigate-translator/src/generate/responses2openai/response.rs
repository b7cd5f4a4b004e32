use serde_json::{json, Map, Value};

use crate::json::{array_field, i64_field, str_field};
use crate::registry::{ParserState, TranslateContext};
use crate::usage;

/// Converts a unary chat completion response into a Responses object.
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

    let id = str_field(payload, "id").unwrap_or("resp_unknown");
    let mut output = Vec::new();

    if let Some(message) = choices.first().and_then(|choice| choice.get("message")) {
        if let Some(text) = str_field(message, "content") {
            if !text.is_empty() {
                output.push(json!({
                    "type": "message",
                    "id": format!("msg_{id}"),
                    "role": "assistant",
                    "status": "completed",
                    "content": [{"type": "output_text", "text": text, "annotations": []}],
                }));
            }
        }
        if let Some(tool_calls) = array_field(message, "tool_calls") {
            for call in tool_calls {
                let function = call.get("function");
                output.push(json!({
                    "type": "function_call",
                    "id": str_field(call, "id").unwrap_or(""),
                    "call_id": str_field(call, "id").unwrap_or(""),
                    "name": function.and_then(|f| str_field(f, "name")).unwrap_or(""),
                    "arguments": function.and_then(|f| str_field(f, "arguments")).unwrap_or("{}"),
                    "status": "completed",
                }));
            }
        }
    }

    let mut out = Map::new();
    out.insert("id".to_string(), json!(id));
    out.insert("object".to_string(), json!("response"));
    out.insert(
        "created_at".to_string(),
        json!(i64_field(payload, "created").unwrap_or(0)),
    );
    out.insert("status".to_string(), json!("completed"));
    out.insert(
        "model".to_string(),
        json!(str_field(payload, "model").unwrap_or(ctx.model)),
    );
    out.insert("output".to_string(), Value::Array(output));
    if let Some(detail) = usage::openai_usage(payload) {
        out.insert(
            "usage".to_string(),
            json!({
                "input_tokens": detail.prompt_tokens,
                "output_tokens": detail.completion_tokens,
                "total_tokens": detail.total_tokens,
            }),
        );
    }
    Value::Object(out)
}
