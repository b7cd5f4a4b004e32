use serde_json::{json, Map, Value};

use crate::json::{array_field, copy_field, i64_field, str_field};

/// Converts an OpenAI Responses request into a chat completion request.
pub fn transform_request(model: &str, payload: &Value, stream: bool) -> Value {
    if !payload.is_object() {
        return payload.clone();
    }

    let mut out = Map::new();
    out.insert("model".to_string(), json!(model));
    out.insert("stream".to_string(), Value::Bool(stream));

    if let Some(max_tokens) = i64_field(payload, "max_output_tokens") {
        out.insert("max_tokens".to_string(), json!(max_tokens));
    }
    copy_field(&mut out, payload, "temperature");
    copy_field(&mut out, payload, "top_p");
    copy_field(&mut out, payload, "parallel_tool_calls");

    if let Some(effort) = payload
        .get("reasoning")
        .and_then(|r| str_field(r, "effort"))
    {
        out.insert("reasoning_effort".to_string(), json!(effort));
    }

    let mut messages = Vec::new();
    if let Some(instructions) = str_field(payload, "instructions") {
        if !instructions.is_empty() {
            messages.push(json!({"role": "system", "content": instructions}));
        }
    }
    match payload.get("input") {
        Some(Value::String(text)) => {
            messages.push(json!({"role": "user", "content": text}));
        }
        Some(Value::Array(items)) => {
            for item in items {
                append_input_item(&mut messages, item);
            }
        }
        _ => {}
    }
    if !messages.is_empty() {
        out.insert("messages".to_string(), Value::Array(messages));
    }

    if let Some(tools) = map_tools(array_field(payload, "tools")) {
        out.insert("tools".to_string(), tools);
    }
    if let Some(choice) = map_tool_choice(payload.get("tool_choice")) {
        out.insert("tool_choice".to_string(), choice);
    }

    Value::Object(out)
}

fn append_input_item(messages: &mut Vec<Value>, item: &Value) {
    let item_type = str_field(item, "type");
    match item_type {
        Some("function_call") => {
            let call_id = str_field(item, "call_id")
                .or_else(|| str_field(item, "id"))
                .unwrap_or("");
            messages.push(json!({
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": {
                        "name": str_field(item, "name").unwrap_or(""),
                        "arguments": str_field(item, "arguments").unwrap_or("{}"),
                    }
                }],
            }));
        }
        Some("function_call_output") => {
            messages.push(json!({
                "role": "tool",
                "tool_call_id": str_field(item, "call_id").unwrap_or(""),
                "content": output_text(item.get("output")),
            }));
        }
        Some("reasoning") => {
            // Reasoning items carry encrypted traces the chat API cannot
            // accept; drop them.
        }
        Some("message") | None => {
            let role = str_field(item, "role").unwrap_or("user");
            if let Some(content) = map_message_content(item.get("content")) {
                messages.push(json!({"role": role, "content": content}));
            }
        }
        _ => {}
    }
}

fn output_text(output: Option<&Value>) -> String {
    match output {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn map_message_content(content: Option<&Value>) -> Option<Value> {
    match content? {
        Value::String(text) => Some(json!(text)),
        Value::Array(parts) => {
            let mut mapped = Vec::new();
            let mut has_images = false;
            for part in parts {
                match str_field(part, "type") {
                    Some("input_text") | Some("output_text") | Some("text") => {
                        if let Some(text) = str_field(part, "text") {
                            mapped.push(json!({"type": "text", "text": text}));
                        }
                    }
                    Some("input_image") => {
                        if let Some(url) = str_field(part, "image_url") {
                            has_images = true;
                            mapped.push(json!({"type": "image_url", "image_url": {"url": url}}));
                        }
                    }
                    _ => {}
                }
            }
            if mapped.is_empty() {
                return None;
            }
            if !has_images {
                let joined = mapped
                    .iter()
                    .filter_map(|part| str_field(part, "text"))
                    .collect::<Vec<_>>()
                    .join("\n");
                return Some(json!(joined));
            }
            Some(Value::Array(mapped))
        }
        _ => None,
    }
}

/// Responses tools are flat (`{type, name, description, parameters}`); chat
/// tools nest them under `function`.
fn map_tools(tools: Option<&[Value]>) -> Option<Value> {
    let tools = tools?;
    let mapped: Vec<Value> = tools
        .iter()
        .filter(|tool| str_field(tool, "type") == Some("function"))
        .filter_map(|tool| {
            let name = str_field(tool, "name")?;
            let mut function = Map::new();
            function.insert("name".to_string(), json!(name));
            if let Some(description) = str_field(tool, "description") {
                function.insert("description".to_string(), json!(description));
            }
            if let Some(parameters) = tool.get("parameters") {
                function.insert("parameters".to_string(), parameters.clone());
            }
            Some(json!({"type": "function", "function": function}))
        })
        .collect();
    if mapped.is_empty() {
        return None;
    }
    Some(Value::Array(mapped))
}

fn map_tool_choice(choice: Option<&Value>) -> Option<Value> {
    match choice? {
        Value::String(mode) => Some(json!(mode)),
        Value::Object(named) if named.get("type").and_then(Value::as_str) == Some("function") => {
            let name = named.get("name").and_then(Value::as_str).unwrap_or("");
            Some(json!({"type": "function", "function": {"name": name}}))
        }
        _ => None,
    }
}
