use serde_json::{json, Map, Value};

use crate::json::{array_field, str_field};

/// Converts a Gemini generateContent request into a chat completion
/// request. Gemini function calls carry no ids, so tool_call ids are
/// synthesized from the function name and position.
pub fn transform_request(model: &str, payload: &Value, stream: bool) -> Value {
    if !payload.is_object() {
        return payload.clone();
    }

    let mut out = Map::new();
    out.insert("model".to_string(), json!(model));
    out.insert("stream".to_string(), Value::Bool(stream));

    if let Some(config) = payload.get("generationConfig") {
        if let Some(temperature) = config.get("temperature").and_then(Value::as_f64) {
            out.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = config.get("topP").and_then(Value::as_f64) {
            out.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(max_tokens) = config.get("maxOutputTokens").and_then(Value::as_i64) {
            out.insert("max_tokens".to_string(), json!(max_tokens));
        }
        if let Some(stops) = config.get("stopSequences").and_then(Value::as_array) {
            let stops: Vec<&str> = stops.iter().filter_map(Value::as_str).collect();
            if !stops.is_empty() {
                out.insert("stop".to_string(), json!(stops));
            }
        }
    }

    let mut messages = Vec::new();
    if let Some(system) = map_system_instruction(payload.get("systemInstruction")) {
        messages.push(system);
    }
    if let Some(contents) = array_field(payload, "contents") {
        for (index, content) in contents.iter().enumerate() {
            append_content(&mut messages, content, index);
        }
    }
    if !messages.is_empty() {
        out.insert("messages".to_string(), Value::Array(messages));
    }

    if let Some(tools) = map_tools(array_field(payload, "tools")) {
        out.insert("tools".to_string(), tools);
    }
    if let Some(choice) = map_tool_config(payload.get("toolConfig")) {
        out.insert("tool_choice".to_string(), choice);
    }

    Value::Object(out)
}

fn map_system_instruction(instruction: Option<&Value>) -> Option<Value> {
    let parts = instruction?.get("parts")?.as_array()?;
    let text = parts
        .iter()
        .filter_map(|part| str_field(part, "text"))
        .collect::<Vec<_>>()
        .join("\n\n");
    if text.is_empty() {
        return None;
    }
    Some(json!({"role": "system", "content": text}))
}

fn append_content(messages: &mut Vec<Value>, content: &Value, index: usize) {
    let role = match str_field(content, "role") {
        Some("model") => "assistant",
        Some(other) => other,
        None => "user",
    };
    let Some(parts) = array_field(content, "parts") else {
        return;
    };

    let mut text_parts: Vec<Value> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();
    let mut has_images = false;

    for (part_index, part) in parts.iter().enumerate() {
        if let Some(text) = str_field(part, "text") {
            if !text.is_empty() {
                text_parts.push(json!({"type": "text", "text": text}));
            }
        } else if let Some(inline) = part.get("inlineData") {
            let mime = str_field(inline, "mimeType").unwrap_or("application/octet-stream");
            if let Some(data) = str_field(inline, "data") {
                has_images = true;
                text_parts.push(json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:{mime};base64,{data}")},
                }));
            }
        } else if let Some(call) = part.get("functionCall") {
            let name = str_field(call, "name").unwrap_or("");
            let arguments = call
                .get("args")
                .map(|args| args.to_string())
                .unwrap_or_else(|| "{}".to_string());
            tool_calls.push(json!({
                "id": synthetic_call_id(name, index, part_index),
                "type": "function",
                "function": {"name": name, "arguments": arguments},
            }));
        } else if let Some(response) = part.get("functionResponse") {
            let name = str_field(response, "name").unwrap_or("");
            let content = response
                .get("response")
                .map(Value::to_string)
                .unwrap_or_default();
            messages.push(json!({
                "role": "tool",
                "tool_call_id": synthetic_call_id(name, index.saturating_sub(1), part_index),
                "content": content,
            }));
        }
    }

    if role == "assistant" && !tool_calls.is_empty() {
        let content = collapse_text(&text_parts, has_images).unwrap_or(json!(""));
        messages.push(json!({
            "role": "assistant",
            "content": content,
            "tool_calls": tool_calls,
        }));
    } else if let Some(content) = collapse_text(&text_parts, has_images) {
        messages.push(json!({"role": role, "content": content}));
    }
}

fn collapse_text(parts: &[Value], has_images: bool) -> Option<Value> {
    if parts.is_empty() {
        return None;
    }
    if !has_images {
        let joined = parts
            .iter()
            .filter_map(|part| str_field(part, "text"))
            .collect::<Vec<_>>()
            .join("\n\n");
        return Some(json!(joined));
    }
    Some(Value::Array(parts.to_vec()))
}

/// Deterministic stand-in for the ids Gemini never sends. The tool response
/// in the following turn reproduces the same id from the same name.
fn synthetic_call_id(name: &str, content_index: usize, part_index: usize) -> String {
    format!("call_{name}_{content_index}_{part_index}")
}

fn map_tools(tools: Option<&[Value]>) -> Option<Value> {
    let tools = tools?;
    let mut mapped = Vec::new();
    for tool in tools {
        let Some(declarations) = array_field(tool, "functionDeclarations") else {
            continue;
        };
        for declaration in declarations {
            let Some(name) = str_field(declaration, "name") else {
                continue;
            };
            let mut function = Map::new();
            function.insert("name".to_string(), json!(name));
            if let Some(description) = str_field(declaration, "description") {
                function.insert("description".to_string(), json!(description));
            }
            if let Some(parameters) = declaration.get("parameters") {
                function.insert("parameters".to_string(), parameters.clone());
            }
            mapped.push(json!({"type": "function", "function": function}));
        }
    }
    if mapped.is_empty() {
        return None;
    }
    Some(Value::Array(mapped))
}

fn map_tool_config(config: Option<&Value>) -> Option<Value> {
    let mode = config?
        .get("functionCallingConfig")
        .and_then(|fcc| str_field(fcc, "mode"))?;
    match mode {
        "AUTO" => Some(json!("auto")),
        "ANY" => Some(json!("required")),
        "NONE" => Some(json!("none")),
        _ => None,
    }
}
