use serde_json::{json, Map, Value};

use crate::json::{array_field, f64_field, i64_field, str_field};

/// Converts an Anthropic create-message request into an OpenAI chat
/// completion request. Optional fields that cannot be mapped are dropped;
/// a payload that is not a JSON object is returned unchanged.
pub fn transform_request(model: &str, payload: &Value, stream: bool) -> Value {
    if !payload.is_object() {
        return payload.clone();
    }

    let mut out = Map::new();
    out.insert("model".to_string(), Value::String(model.to_string()));

    if let Some(max_tokens) = i64_field(payload, "max_tokens") {
        out.insert("max_tokens".to_string(), json!(max_tokens));
    }

    // Prefer temperature over top_p; never send both.
    if let Some(temperature) = f64_field(payload, "temperature") {
        out.insert("temperature".to_string(), json!(temperature));
    } else if let Some(top_p) = f64_field(payload, "top_p") {
        out.insert("top_p".to_string(), json!(top_p));
    }

    if let Some(stops) = array_field(payload, "stop_sequences") {
        let stops: Vec<&str> = stops.iter().filter_map(Value::as_str).collect();
        match stops.as_slice() {
            [] => {}
            [single] => {
                out.insert("stop".to_string(), json!(single));
            }
            many => {
                out.insert("stop".to_string(), json!(many));
            }
        }
    }

    out.insert("stream".to_string(), Value::Bool(stream));

    if let Some(effort) = map_thinking(model, payload.get("thinking")) {
        out.insert("reasoning_effort".to_string(), Value::String(effort));
    }

    let mut messages = Vec::new();
    if let Some(system) = map_system(payload.get("system")) {
        messages.push(system);
    }
    if let Some(items) = array_field(payload, "messages") {
        for message in items {
            append_message(&mut messages, message);
        }
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

    if let Some(user) = payload.get("metadata").and_then(|m| m.get("user_id")).and_then(Value::as_str) {
        out.insert("user".to_string(), json!(user));
    }

    Value::Object(out)
}

/// Maps `thinking` to a reasoning effort for models that understand one.
/// `enabled` scales with budget_tokens; `disabled` maps to the model's off
/// switch where it has one, otherwise the field is omitted.
fn map_thinking(model: &str, thinking: Option<&Value>) -> Option<String> {
    let thinking = thinking?.as_object()?;
    match thinking.get("type").and_then(Value::as_str) {
        Some("enabled") => {
            let budget = thinking.get("budget_tokens").and_then(Value::as_i64);
            thinking_budget_to_effort(model, budget.unwrap_or(-1))
        }
        Some("disabled") => thinking_budget_to_effort(model, 0),
        _ => None,
    }
}

/// Model-aware effort table. Budget 0 means "thinking disabled", negative
/// means "enabled without a budget".
pub fn thinking_budget_to_effort(model: &str, budget: i64) -> Option<String> {
    let lower = model.to_ascii_lowercase();
    let reasoning_capable = ["gpt-5", "o1", "o3", "o4", "deepseek-r"]
        .iter()
        .any(|prefix| lower.starts_with(prefix));

    if budget == 0 {
        // Only the gpt-5.1 family accepts an explicit off switch.
        return lower.starts_with("gpt-5.1").then(|| "none".to_string());
    }
    if !reasoning_capable {
        return None;
    }
    let effort = match budget {
        b if b < 0 => "auto",
        b if b < 4096 => "low",
        b if b < 16384 => "medium",
        _ => "high",
    };
    Some(effort.to_string())
}

/// Accepts either a string or an array of typed parts; text parts join with
/// a blank line. No prefatory hints are added.
fn map_system(system: Option<&Value>) -> Option<Value> {
    let system = system?;
    let text = match system {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|block| str_field(block, "type") == Some("text"))
            .filter_map(|block| str_field(block, "text"))
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    Some(json!({"role": "system", "content": text}))
}

fn append_message(messages: &mut Vec<Value>, message: &Value) {
    let role = str_field(message, "role").unwrap_or("user");
    let Some(content) = message.get("content") else {
        return;
    };

    if let Some(text) = content.as_str() {
        messages.push(json!({"role": role, "content": text}));
        return;
    }
    let Some(parts) = content.as_array() else {
        return;
    };

    let mut text_parts: Vec<Value> = Vec::new();
    let mut reasoning_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();
    let mut tool_results: Vec<Value> = Vec::new();
    let mut has_images = false;

    for part in parts {
        match str_field(part, "type") {
            Some("text") => {
                if let Some(text) = str_field(part, "text") {
                    if !text.trim().is_empty() {
                        text_parts.push(json!({"type": "text", "text": text}));
                    }
                }
            }
            Some("image") => {
                if let Some(image) = map_image_part(part) {
                    has_images = true;
                    text_parts.push(image);
                }
            }
            Some("thinking") => {
                // Assistant-only: thinking from other roles would let a
                // caller inject fake reasoning.
                if role == "assistant" {
                    if let Some(text) = str_field(part, "thinking") {
                        if !text.trim().is_empty() {
                            reasoning_parts.push(text.to_string());
                        }
                    }
                }
            }
            Some("redacted_thinking") => {
                // Never forwarded.
            }
            Some("tool_use") => {
                if role == "assistant" {
                    tool_calls.push(map_tool_use(part));
                }
            }
            Some("tool_result") => {
                tool_results.push(map_tool_result(part));
            }
            _ => {}
        }
    }

    // Tool results answer the previous assistant's tool_calls, so they must
    // land before this message's own content.
    messages.append(&mut tool_results);

    if role == "assistant" {
        let has_text = !text_parts.is_empty();
        let has_reasoning = !reasoning_parts.is_empty();
        if !has_text && !has_reasoning && tool_calls.is_empty() {
            return;
        }
        let mut out = Map::new();
        out.insert("role".to_string(), json!("assistant"));
        out.insert(
            "content".to_string(),
            collapse_content(text_parts, has_images).unwrap_or(json!("")),
        );
        if has_reasoning {
            out.insert(
                "reasoning_content".to_string(),
                json!(reasoning_parts.join("\n\n")),
            );
        }
        if !tool_calls.is_empty() {
            out.insert("tool_calls".to_string(), Value::Array(tool_calls));
        }
        messages.push(Value::Object(out));
    } else if let Some(content) = collapse_content(text_parts, has_images) {
        messages.push(json!({"role": role, "content": content}));
    }
}

/// Text-only content collapses to a plain string; mixed text and image
/// content stays an array of typed parts.
fn collapse_content(parts: Vec<Value>, has_images: bool) -> Option<Value> {
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
    Some(Value::Array(parts))
}

fn map_image_part(part: &Value) -> Option<Value> {
    let url = match part.get("source") {
        Some(source) => match str_field(source, "type") {
            Some("base64") => {
                let media_type = str_field(source, "media_type").unwrap_or("application/octet-stream");
                let data = str_field(source, "data")?;
                format!("data:{media_type};base64,{data}")
            }
            Some("url") => str_field(source, "url")?.to_string(),
            _ => str_field(part, "url")?.to_string(),
        },
        None => str_field(part, "url")?.to_string(),
    };
    Some(json!({"type": "image_url", "image_url": {"url": url}}))
}

fn map_tool_use(part: &Value) -> Value {
    let arguments = match part.get("input") {
        Some(input) => serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
        None => "{}".to_string(),
    };
    json!({
        "id": str_field(part, "id").unwrap_or(""),
        "type": "function",
        "function": {
            "name": str_field(part, "name").unwrap_or(""),
            "arguments": arguments,
        }
    })
}

fn map_tool_result(part: &Value) -> Value {
    json!({
        "role": "tool",
        "tool_call_id": str_field(part, "tool_use_id").unwrap_or(""),
        "content": tool_result_text(part.get("content")),
    })
}

fn tool_result_text(content: Option<&Value>) -> String {
    let Some(content) = content else {
        return String::new();
    };
    match content {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => match str_field(other, "text") {
                    Some(text) => text.to_string(),
                    None => other.to_string(),
                },
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        other => match str_field(other, "text") {
            Some(text) => text.to_string(),
            None => other.to_string(),
        },
    }
}

fn map_tools(tools: Option<&[Value]>) -> Option<Value> {
    let tools = tools?;
    let mapped: Vec<Value> = tools
        .iter()
        .filter_map(|tool| {
            let name = str_field(tool, "name")?;
            let mut function = Map::new();
            function.insert("name".to_string(), json!(name));
            function.insert(
                "description".to_string(),
                json!(str_field(tool, "description").unwrap_or("")),
            );
            if let Some(schema) = tool.get("input_schema") {
                function.insert("parameters".to_string(), schema.clone());
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
    let choice = choice?;
    if !choice.is_object() {
        return None;
    }
    match str_field(choice, "type") {
        Some("auto") => Some(json!("auto")),
        Some("any") => Some(json!("required")),
        Some("tool") => {
            let name = str_field(choice, "name").unwrap_or("");
            Some(json!({"type": "function", "function": {"name": name}}))
        }
        _ => Some(json!("auto")),
    }
}
