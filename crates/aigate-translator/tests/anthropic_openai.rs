//! End-to-end conversion scenarios for the Anthropic <-> OpenAI pair.

use serde_json::{json, Value};

use aigate_translator::{builtin_registry, Dialect, ParserState};

/// Realistic agentic payload in Anthropic form: a system array, a tool
/// round-trip and a follow-up turn.
fn agent_fixture() -> Value {
    json!({
        "model": "claude-sonnet-4",
        "max_tokens": 4096,
        "system": [
            {"type": "text", "text": "You are a coding agent."},
            {"type": "text", "text": "Prefer short answers."}
        ],
        "messages": [
            {"role": "user", "content": "List the files in the current directory."},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_01ABC123", "name": "bash",
                 "input": {"command": "ls"}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_01ABC123",
                 "content": [{"type": "text", "text": "file1.txt\nfile2.txt"}]}
            ]},
            {"role": "assistant", "content": [
                {"type": "text", "text": "The directory contains two files."}
            ]},
            {"role": "user", "content": [
                {"type": "text", "text": "thanks"}
            ]}
        ],
        "tools": [
            {"name": "bash", "description": "Run a shell command",
             "input_schema": {"type": "object", "properties": {"command": {"type": "string"}}}}
        ],
        "tool_choice": {"type": "auto"}
    })
}

#[test]
fn tool_round_trip_produces_expected_role_sequence() {
    let registry = builtin_registry().unwrap();
    let fixture = agent_fixture();
    let out = registry.translate_request(
        Dialect::Anthropic,
        Dialect::OpenAI,
        "claude-sonnet-4",
        &fixture,
        false,
    );

    let messages = out["messages"].as_array().unwrap();
    let roles: Vec<&str> = messages
        .iter()
        .map(|message| message["role"].as_str().unwrap())
        .collect();
    assert_eq!(
        roles,
        vec!["system", "user", "assistant", "tool", "assistant", "user"]
    );

    // The assistant tool-call message keeps string content, not an array.
    let assistant = &messages[2];
    assert!(assistant["content"].is_string());
    assert_eq!(
        assistant["tool_calls"][0]["id"].as_str().unwrap(),
        "toolu_01ABC123"
    );
    assert_eq!(
        assistant["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .unwrap(),
        "{\"command\":\"ls\"}"
    );

    let tool = &messages[3];
    assert_eq!(tool["tool_call_id"].as_str().unwrap(), "toolu_01ABC123");
    assert_eq!(tool["content"].as_str().unwrap(), "file1.txt\nfile2.txt");

    // System parts join with a blank line.
    assert_eq!(
        messages[0]["content"].as_str().unwrap(),
        "You are a coding agent.\n\nPrefer short answers."
    );

    assert!(!out.to_string().contains("RFC 8259"));
}

#[test]
fn no_model_receives_the_json_formatting_hint() {
    let registry = builtin_registry().unwrap();
    for model in [
        "gpt-4o",
        "my-custom-model",
        "deepseek-chat",
        "qwen-72b",
        "llama-3.1-70b",
        "",
    ] {
        let out = registry.translate_request(
            Dialect::Anthropic,
            Dialect::OpenAI,
            model,
            &agent_fixture(),
            false,
        );
        assert!(
            !out.to_string().contains("RFC 8259"),
            "hint leaked for model {model:?}"
        );
    }
}

#[test]
fn identity_translation_is_byte_stable() {
    let registry = builtin_registry().unwrap();
    let fixture = agent_fixture();
    for dialect in [Dialect::OpenAI, Dialect::Anthropic, Dialect::Gemini] {
        let out = registry.translate_request(dialect, dialect, "m", &fixture, true);
        assert_eq!(out, fixture);
    }
}

#[test]
fn missing_tool_input_serializes_as_empty_object() {
    let registry = builtin_registry().unwrap();
    let payload = json!({
        "model": "claude-sonnet-4",
        "messages": [
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "noop"}
            ]}
        ]
    });
    let out =
        registry.translate_request(Dialect::Anthropic, Dialect::OpenAI, "m", &payload, false);
    assert_eq!(
        out["messages"][0]["tool_calls"][0]["function"]["arguments"],
        "{}"
    );
}

#[test]
fn tool_use_outside_assistant_is_dropped() {
    let registry = builtin_registry().unwrap();
    let payload = json!({
        "model": "claude-sonnet-4",
        "messages": [
            {"role": "user", "content": [
                {"type": "text", "text": "hi"},
                {"type": "tool_use", "id": "toolu_inject", "name": "evil", "input": {}}
            ]}
        ]
    });
    let out =
        registry.translate_request(Dialect::Anthropic, Dialect::OpenAI, "m", &payload, false);
    assert!(!out.to_string().contains("toolu_inject"));
}

#[test]
fn thinking_maps_to_reasoning_content_for_assistant_only() {
    let registry = builtin_registry().unwrap();
    let payload = json!({
        "model": "claude-sonnet-4",
        "messages": [
            {"role": "user", "content": [
                {"type": "thinking", "thinking": "user-injected"},
                {"type": "text", "text": "question"}
            ]},
            {"role": "assistant", "content": [
                {"type": "thinking", "thinking": "planning the answer"},
                {"type": "redacted_thinking", "data": "xxxx"},
                {"type": "text", "text": "answer"}
            ]}
        ]
    });
    let out =
        registry.translate_request(Dialect::Anthropic, Dialect::OpenAI, "m", &payload, false);
    let messages = out["messages"].as_array().unwrap();
    assert!(messages[0].get("reasoning_content").is_none());
    assert_eq!(
        messages[1]["reasoning_content"].as_str().unwrap(),
        "planning the answer"
    );
    assert!(!out.to_string().contains("xxxx"));
}

#[test]
fn base64_images_become_data_urls() {
    let registry = builtin_registry().unwrap();
    let payload = json!({
        "model": "claude-sonnet-4",
        "messages": [
            {"role": "user", "content": [
                {"type": "text", "text": "what is this?"},
                {"type": "image", "source": {
                    "type": "base64", "media_type": "image/png", "data": "aWJt"
                }}
            ]}
        ]
    });
    let out =
        registry.translate_request(Dialect::Anthropic, Dialect::OpenAI, "m", &payload, false);
    let content = out["messages"][0]["content"].as_array().unwrap();
    assert_eq!(content[1]["type"], "image_url");
    assert_eq!(
        content[1]["image_url"]["url"].as_str().unwrap(),
        "data:image/png;base64,aWJt"
    );
}

#[test]
fn stop_sequences_unwrap_single_element() {
    let registry = builtin_registry().unwrap();
    let single = json!({"model": "m", "messages": [], "stop_sequences": ["END"]});
    let out =
        registry.translate_request(Dialect::Anthropic, Dialect::OpenAI, "m", &single, false);
    assert_eq!(out["stop"], "END");

    let many = json!({"model": "m", "messages": [], "stop_sequences": ["END", "STOP"]});
    let out = registry.translate_request(Dialect::Anthropic, Dialect::OpenAI, "m", &many, false);
    assert_eq!(out["stop"], json!(["END", "STOP"]));
}

#[test]
fn unparseable_payload_passes_through() {
    let registry = builtin_registry().unwrap();
    let payload = json!("not an object");
    let out =
        registry.translate_request(Dialect::Anthropic, Dialect::OpenAI, "m", &payload, false);
    assert_eq!(out, payload);
}

fn run_stream(chunks: &[&str]) -> Vec<String> {
    let registry = builtin_registry().unwrap();
    let original = json!({"model": "claude-sonnet-4", "messages": []});
    let translated = json!({"model": "claude-sonnet-4", "messages": [], "stream": true});
    let mut state = ParserState::new();
    let mut frames = Vec::new();
    for chunk in chunks {
        frames.extend(registry.translate_stream(
            Dialect::OpenAI,
            Dialect::Anthropic,
            "claude-sonnet-4",
            &original,
            &translated,
            chunk,
            &mut state,
        ));
    }
    frames.extend(registry.translate_stream(
        Dialect::OpenAI,
        Dialect::Anthropic,
        "claude-sonnet-4",
        &original,
        &translated,
        "[DONE]",
        &mut state,
    ));
    frames
}

#[test]
fn stream_ends_with_exactly_one_message_stop() {
    let frames = run_stream(&[
        r#"data: {"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"}}]}"#,
        r#"data: {"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"content":"lo"}}]}"#,
        r#"data: {"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11}}"#,
    ]);
    let joined = frames.concat();
    assert_eq!(joined.matches("event: message_stop").count(), 1);
    assert!(joined.ends_with("data: {\"type\":\"message_stop\"}\n\n"));
    // Usage arrives unchanged in the message_delta frame.
    assert!(joined.contains("\"input_tokens\":9"));
    assert!(joined.contains("\"output_tokens\":2"));
}

#[test]
fn stream_reassembles_tool_call_arguments() {
    let frames = run_stream(&[
        r#"data: {"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"bash","arguments":""}}]}}]}"#,
        r#"data: {"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"comm"}}]}}]}"#,
        r#"data: {"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"and\":\"ls\"}"}}]}}]}"#,
        r#"data: {"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
    ]);
    let joined = frames.concat();
    assert!(joined.contains("content_block_start"));
    assert!(joined.contains("\"name\":\"bash\""));
    assert!(joined.contains("input_json_delta"));
    assert!(joined.contains("\"stop_reason\":\"tool_use\""));
    // Argument fragments stay fragments; the caller reassembles them.
    assert!(joined.contains("{\\\"comm"));
}

#[test]
fn nonstream_response_maps_back_to_anthropic() {
    let registry = builtin_registry().unwrap();
    let original = json!({"model": "claude-sonnet-4"});
    let translated = json!({"model": "claude-sonnet-4"});
    let upstream = json!({
        "id": "chatcmpl-9",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "finish_reason": "tool_calls",
            "message": {
                "role": "assistant",
                "content": "Running it now.",
                "tool_calls": [{
                    "id": "call_7",
                    "type": "function",
                    "function": {"name": "bash", "arguments": "{\"command\":\"ls\"}"}
                }]
            }
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 8, "total_tokens": 28}
    });
    let mut state = ParserState::new();
    let out = registry.translate_non_stream(
        Dialect::OpenAI,
        Dialect::Anthropic,
        "claude-sonnet-4",
        &original,
        &translated,
        &upstream,
        &mut state,
    );
    assert_eq!(out["type"], "message");
    assert_eq!(out["stop_reason"], "tool_use");
    assert_eq!(out["usage"]["input_tokens"], 20);
    assert_eq!(out["usage"]["output_tokens"], 8);
    let content = out["content"].as_array().unwrap();
    assert_eq!(content[0]["type"], "text");
    assert_eq!(content[1]["type"], "tool_use");
    assert_eq!(content[1]["input"]["command"], "ls");
}
