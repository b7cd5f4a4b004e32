//! Conversion scenarios for the Responses and Gemini pairs.

use serde_json::{json, Value};

use aigate_translator::{builtin_registry, Dialect, ParserState};

#[test]
fn responses_request_maps_input_items() {
    let registry = builtin_registry().unwrap();
    let payload = json!({
        "model": "gpt-4o",
        "instructions": "Be terse.",
        "max_output_tokens": 512,
        "reasoning": {"effort": "high"},
        "input": [
            {"type": "message", "role": "user", "content": [
                {"type": "input_text", "text": "run ls"}
            ]},
            {"type": "function_call", "call_id": "call_9", "name": "bash",
             "arguments": "{\"command\":\"ls\"}"},
            {"type": "function_call_output", "call_id": "call_9", "output": "file1.txt"}
        ],
        "tools": [{"type": "function", "name": "bash", "parameters": {"type": "object"}}]
    });
    let out = registry.translate_request(
        Dialect::OpenAIResponses,
        Dialect::OpenAI,
        "gpt-4o",
        &payload,
        false,
    );

    assert_eq!(out["max_tokens"], 512);
    assert_eq!(out["reasoning_effort"], "high");
    let messages = out["messages"].as_array().unwrap();
    let roles: Vec<&str> = messages
        .iter()
        .map(|message| message["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
    assert_eq!(messages[2]["tool_calls"][0]["id"], "call_9");
    assert_eq!(messages[3]["tool_call_id"], "call_9");
    assert_eq!(out["tools"][0]["function"]["name"], "bash");
}

#[test]
fn responses_stream_terminates_with_completed() {
    let registry = builtin_registry().unwrap();
    let original = json!({"model": "gpt-4o"});
    let translated = json!({"model": "gpt-4o", "stream": true});
    let mut state = ParserState::new();
    let mut frames = Vec::new();
    for chunk in [
        r#"data: {"id":"chatcmpl-2","model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"Hi"}}]}"#,
        r#"data: {"id":"chatcmpl-2","model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":4,"completion_tokens":1,"total_tokens":5}}"#,
        "[DONE]",
    ] {
        frames.extend(registry.translate_stream(
            Dialect::OpenAI,
            Dialect::OpenAIResponses,
            "gpt-4o",
            &original,
            &translated,
            chunk,
            &mut state,
        ));
    }
    let joined = frames.concat();
    assert!(joined.starts_with("event: response.created"));
    assert!(joined.contains("response.output_text.delta"));
    assert_eq!(joined.matches("event: response.completed").count(), 1);
    assert!(!joined.contains("[DONE]"));
    assert!(joined.contains("\"total_tokens\":5"));
}

#[test]
fn gemini_request_maps_contents_and_tools() {
    let registry = builtin_registry().unwrap();
    let payload = json!({
        "systemInstruction": {"parts": [{"text": "Be helpful."}]},
        "contents": [
            {"role": "user", "parts": [{"text": "what's in this image?"},
                {"inlineData": {"mimeType": "image/png", "data": "aWJt"}}]},
            {"role": "model", "parts": [{"functionCall": {"name": "lookup", "args": {"q": "x"}}}]}
        ],
        "generationConfig": {"temperature": 0.2, "maxOutputTokens": 100},
        "tools": [{"functionDeclarations": [
            {"name": "lookup", "description": "Search", "parameters": {"type": "object"}}
        ]}]
    });
    let out = registry.translate_request(
        Dialect::Gemini,
        Dialect::OpenAI,
        "gemini-2.0-flash",
        &payload,
        false,
    );

    assert_eq!(out["model"], "gemini-2.0-flash");
    assert_eq!(out["temperature"], 0.2);
    assert_eq!(out["max_tokens"], 100);
    let messages = out["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["role"], "user");
    assert!(messages[1]["content"].is_array());
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(
        messages[2]["tool_calls"][0]["function"]["name"],
        "lookup"
    );
    assert_eq!(out["tools"][0]["function"]["name"], "lookup");
}

#[test]
fn gemini_stream_has_no_extra_terminator() {
    let registry = builtin_registry().unwrap();
    let original = json!({"contents": []});
    let translated = json!({"model": "gemini-2.0-flash", "stream": true});
    let mut state = ParserState::new();
    let mut frames = Vec::new();
    for chunk in [
        r#"data: {"id":"chatcmpl-3","choices":[{"index":0,"delta":{"content":"Hello"}}]}"#,
        r#"data: {"id":"chatcmpl-3","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":2,"completion_tokens":1,"total_tokens":3}}"#,
        "[DONE]",
    ] {
        frames.extend(registry.translate_stream(
            Dialect::OpenAI,
            Dialect::Gemini,
            "gemini-2.0-flash",
            &original,
            &translated,
            chunk,
            &mut state,
        ));
    }
    let joined = frames.concat();
    assert!(!joined.contains("[DONE]"));
    assert_eq!(joined.matches("finishReason").count(), 1);
    assert!(joined.contains("\"promptTokenCount\":2"));

    let last = frames.last().unwrap();
    let payload: Value =
        serde_json::from_str(last.trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(payload["candidates"][0]["finishReason"], "STOP");
}

#[test]
fn gemini_cli_frames_are_wrapped_in_response_envelopes() {
    let registry = builtin_registry().unwrap();
    let original = json!({"model": "gemini-2.0-flash", "request": {"contents": []}});
    let translated = json!({"model": "gemini-2.0-flash", "stream": true});
    let mut state = ParserState::new();
    let mut frames = Vec::new();
    for chunk in [
        r#"data: {"id":"chatcmpl-4","choices":[{"index":0,"delta":{"content":"Hey"}}]}"#,
        "[DONE]",
    ] {
        frames.extend(registry.translate_stream(
            Dialect::OpenAI,
            Dialect::GeminiCli,
            "gemini-2.0-flash",
            &original,
            &translated,
            chunk,
            &mut state,
        ));
    }
    for frame in &frames {
        let payload: Value =
            serde_json::from_str(frame.trim_start_matches("data: ").trim()).unwrap();
        assert!(payload.get("response").is_some());
    }
}

#[test]
fn codex_delegates_to_the_responses_wire() {
    let registry = builtin_registry().unwrap();
    let payload = json!({
        "model": "gpt-5.1-codex",
        "instructions": "You are Codex.",
        "input": [{"type": "message", "role": "user", "content": "hi"}]
    });
    let out = registry.translate_request(
        Dialect::Codex,
        Dialect::OpenAI,
        "gpt-5.1-codex",
        &payload,
        true,
    );
    assert_eq!(out["stream"], true);
    let messages = out["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[0]["content"], "You are Codex.");
    assert_eq!(messages[1]["role"], "user");
}
