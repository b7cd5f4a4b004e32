//! GitHub Copilot executor: OpenAI-compatible chat completions behind a
//! refreshed short-lived token.

mod refresh;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use rand::RngCore;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use aigate_config::PayloadRule;
use aigate_limits::match_model;
use aigate_translator::generate::anthropic2openai::request::thinking_budget_to_effort;
use aigate_translator::{Dialect, ParserState, Registry};
use aigate_usage::RequestStatistics;

use crate::audit::RequestAudit;
use crate::client::shared_client;
use crate::credential::Credential;
use crate::errors::ExecuteError;
use crate::provider::{ExecuteOptions, ExecuteRequest, Provider, StreamChunk};
use crate::scan::LineScanner;
use crate::usage::{parse_openai_stream_usage, parse_openai_usage, UsageReporter};

const STREAM_CHANNEL_CAPACITY: usize = 64;
const KNOWN_EFFORTS: [&str; 7] = ["minimal", "low", "medium", "high", "xhigh", "auto", "none"];

/// Responses-API item types that mark an agent-driven turn.
const AGENT_INPUT_TYPES: [&str; 10] = [
    "file_search_call",
    "computer_call",
    "computer_call_output",
    "function_call",
    "function_call_output",
    "web_search_call",
    "reasoning",
    "mcp_list_tools",
    "mcp_call_tool",
    "mcp_call_tool_result",
];

pub struct CopilotExecutor {
    registry: Arc<Registry>,
    stats: Arc<RequestStatistics>,
    payload_rules: Vec<PayloadRule>,
    proxy: Option<String>,
}

impl CopilotExecutor {
    pub fn new(
        registry: Arc<Registry>,
        stats: Arc<RequestStatistics>,
        payload_rules: Vec<PayloadRule>,
        proxy: Option<String>,
    ) -> Self {
        Self {
            registry,
            stats,
            payload_rules,
            proxy,
        }
    }

    fn reporter(&self, request: &ExecuteRequest, opts: &ExecuteOptions) -> UsageReporter {
        UsageReporter::new(
            self.stats.clone(),
            self.identifier(),
            opts.api_key.clone(),
            request.model.clone(),
        )
    }

    /// Translates the caller payload to the OpenAI wire and applies the
    /// Copilot-specific shaping.
    fn build_body(
        &self,
        request: &ExecuteRequest,
        opts: &ExecuteOptions,
        stream: bool,
    ) -> Result<Value, ExecuteError> {
        let mut body = self.registry.translate_request(
            opts.source_dialect,
            Dialect::OpenAI,
            &request.model,
            &request.payload,
            stream,
        );
        if !body.is_object() {
            // Unparseable payloads travel unchanged; the upstream returns
            // the authoritative error.
            return Ok(body);
        }

        if let Some(effort) = request.metadata.get("reasoning_effort").and_then(Value::as_str) {
            body["reasoning_effort"] = json!(effort);
        }
        body["model"] = json!(request.model);
        normalize_thinking(&mut body, &request.model);
        validate_thinking(&body)?;
        if stream {
            body["stream_options"] = json!({"include_usage": true});
        }
        apply_payload_rules(&mut body, &self.payload_rules, &request.model);
        apply_copilot_body_optimizations(&mut body);
        Ok(body)
    }

    fn dispatch(
        &self,
        token: &str,
        base: &str,
        body: &Value,
        opts: &ExecuteOptions,
        audit: &RequestAudit,
        credential: &Credential,
    ) -> Result<(String, Vec<u8>, http::HeaderMap), ExecuteError> {
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));
        let encoded = serde_json::to_vec(body)
            .map_err(|err| ExecuteError::Transport(err.to_string()))?;

        let mut headers = copilot_headers(token);
        headers.insert(
            "x-initiator",
            header_value(&detect_initiator(opts, body)),
        );
        if contains_vision_content(body) {
            headers.insert("copilot-vision-request", header_value("true"));
        }

        audit.record_request(&url, "POST", &headers, encoded.len(), &credential.label);
        Ok((url, encoded, headers))
    }
}

#[async_trait]
impl Provider for CopilotExecutor {
    fn identifier(&self) -> &'static str {
        "copilot"
    }

    async fn execute(
        &self,
        credential: Arc<Credential>,
        request: ExecuteRequest,
        opts: ExecuteOptions,
    ) -> Result<Bytes, ExecuteError> {
        let (token, base) = refresh::ensure_token(&credential, self.proxy.as_deref()).await?;
        let mut reporter = self.reporter(&request, &opts);
        let body = self.build_body(&request, &opts, false)?;
        let audit = RequestAudit::new(self.identifier(), opts.trace_id.clone());
        let (url, encoded, headers) = self.dispatch(&token, &base, &body, &opts, &audit, &credential)?;

        let client = shared_client(self.proxy.as_deref())?;
        let response = client
            .post(&url)
            .headers(headers)
            .body(encoded)
            .send()
            .await
            .map_err(|err| {
                audit.record_error(&err);
                ExecuteError::Transport(err.to_string())
            })?;

        let status = response.status().as_u16();
        audit.record_response(status, response.headers());
        let data = response
            .bytes()
            .await
            .map_err(|err| ExecuteError::Transport(err.to_string()))?;
        if !(200..300).contains(&status) {
            reporter.publish_failure();
            return Err(ExecuteError::UpstreamStatus { code: status, body: data });
        }

        reporter.publish(parse_openai_usage(&data));
        let upstream: Value = match serde_json::from_slice(&data) {
            Ok(parsed) => parsed,
            Err(_) => return Ok(data),
        };
        let mut state = ParserState::new();
        let out = self.registry.translate_non_stream(
            Dialect::OpenAI,
            opts.source_dialect,
            &request.model,
            &opts.original_request,
            &body,
            &upstream,
            &mut state,
        );
        let encoded = serde_json::to_vec(&out)
            .map_err(|err| ExecuteError::Transport(err.to_string()))?;
        Ok(Bytes::from(encoded))
    }

    async fn execute_stream(
        &self,
        credential: Arc<Credential>,
        request: ExecuteRequest,
        opts: ExecuteOptions,
    ) -> Result<mpsc::Receiver<StreamChunk>, ExecuteError> {
        let (token, base) = refresh::ensure_token(&credential, self.proxy.as_deref()).await?;
        let mut reporter = self.reporter(&request, &opts);
        let body = self.build_body(&request, &opts, true)?;
        let mut audit = RequestAudit::new(self.identifier(), opts.trace_id.clone());
        let (url, encoded, headers) = self.dispatch(&token, &base, &body, &opts, &audit, &credential)?;

        let client = shared_client(self.proxy.as_deref())?;
        let response = client
            .post(&url)
            .headers(headers)
            .body(encoded)
            .send()
            .await
            .map_err(|err| {
                audit.record_error(&err);
                ExecuteError::Transport(err.to_string())
            })?;

        let status = response.status().as_u16();
        audit.record_response(status, response.headers());
        if !(200..300).contains(&status) {
            let data = response.bytes().await.unwrap_or_default();
            reporter.publish_failure();
            return Err(ExecuteError::UpstreamStatus { code: status, body: data });
        }

        let (tx, rx) = mpsc::channel::<StreamChunk>(STREAM_CHANNEL_CAPACITY);
        let registry = self.registry.clone();
        let model = request.model.clone();
        let source = opts.source_dialect;
        let original = opts.original_request.clone();

        tokio::spawn(async move {
            let mut scanner = LineScanner::new();
            let mut state = ParserState::new();
            let mut stream = response.bytes_stream();
            let mut scan_failed = false;

            'outer: while let Some(item) = stream.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        audit.record_error(&err);
                        reporter.publish_failure();
                        let _ = tx
                            .send(Err(ExecuteError::Transport(err.to_string())))
                            .await;
                        scan_failed = true;
                        break;
                    }
                };
                let lines = match scanner.push(&chunk) {
                    Ok(lines) => lines,
                    Err(err) => {
                        audit.record_error(&err);
                        reporter.publish_failure();
                        let _ = tx
                            .send(Err(ExecuteError::Transport(err.to_string())))
                            .await;
                        scan_failed = true;
                        break;
                    }
                };
                for line in lines {
                    audit.append_chunk(line.as_bytes());
                    if let Some(detail) = parse_openai_stream_usage(&line) {
                        reporter.publish(Some(detail));
                    }
                    for frame in registry.translate_stream(
                        Dialect::OpenAI,
                        source,
                        &model,
                        &original,
                        &body,
                        &line,
                        &mut state,
                    ) {
                        if tx.send(Ok(Bytes::from(frame))).await.is_err() {
                            break 'outer;
                        }
                    }
                }
            }

            if !scan_failed {
                if let Some(line) = scanner.finish() {
                    audit.append_chunk(line.as_bytes());
                    if let Some(detail) = parse_openai_stream_usage(&line) {
                        reporter.publish(Some(detail));
                    }
                    for frame in registry.translate_stream(
                        Dialect::OpenAI,
                        source,
                        &model,
                        &original,
                        &body,
                        &line,
                        &mut state,
                    ) {
                        if tx.send(Ok(Bytes::from(frame))).await.is_err() {
                            return;
                        }
                    }
                }
                reporter.publish(None);
                for frame in registry.translate_stream(
                    Dialect::OpenAI,
                    source,
                    &model,
                    &original,
                    &body,
                    aigate_translator::sse::DONE_CHUNK,
                    &mut state,
                ) {
                    if tx.send(Ok(Bytes::from(frame))).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn count_tokens(
        &self,
        _credential: Arc<Credential>,
        request: ExecuteRequest,
        opts: ExecuteOptions,
    ) -> Result<Bytes, ExecuteError> {
        let body = self.registry.translate_request(
            opts.source_dialect,
            Dialect::OpenAI,
            &request.model,
            &request.payload,
            false,
        );
        let total = approximate_chat_tokens(&body);
        let out = json!({"total_tokens": total});
        Ok(Bytes::from(out.to_string()))
    }

    async fn refresh(&self, credential: Arc<Credential>) -> Result<(), ExecuteError> {
        refresh::force_refresh(&credential, self.proxy.as_deref()).await
    }
}

fn header_value(value: &str) -> http::HeaderValue {
    http::HeaderValue::from_str(value)
        .unwrap_or_else(|_| http::HeaderValue::from_static("invalid"))
}

fn copilot_headers(token: &str) -> http::HeaderMap {
    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::AUTHORIZATION,
        header_value(&format!("Bearer {token}")),
    );
    headers.insert(http::header::CONTENT_TYPE, header_value("application/json"));
    headers.insert(http::header::ACCEPT, header_value("application/json"));
    headers.insert(http::header::USER_AGENT, header_value("GitHubCopilotChat/1.0"));
    headers.insert("editor-version", header_value("vscode/1.85.0"));
    headers.insert("editor-plugin-version", header_value("copilot-chat/0.11.1"));
    headers.insert("openai-organization", header_value("github-copilot"));
    headers.insert("openai-intent", header_value("conversation-panel"));
    headers.insert("copilot-integration-id", header_value("vscode-chat"));
    headers.insert("vscode-sessionid", header_value(&random_hex(16)));
    headers.insert("vscode-machineid", header_value(&random_hex(32)));
    headers
}

fn random_hex(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buffer);
    buffer.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Premium-billing header. Explicit override first, then the last element
/// of the payload; anything ambiguous stays "agent" so a request is never
/// billed premium by accident.
pub fn detect_initiator(opts: &ExecuteOptions, body: &Value) -> String {
    if let Some(explicit) = opts
        .metadata
        .get("x_initiator")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
    {
        return explicit.to_string();
    }

    if let Some(last) = body
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| messages.last())
    {
        return match last.get("role").and_then(Value::as_str) {
            Some("user") => "user".to_string(),
            _ => "agent".to_string(),
        };
    }

    if let Some(last) = body
        .get("input")
        .and_then(Value::as_array)
        .and_then(|input| input.last())
    {
        if last.get("role").and_then(Value::as_str) == Some("assistant") {
            return "agent".to_string();
        }
        if let Some(item_type) = last.get("type").and_then(Value::as_str) {
            if AGENT_INPUT_TYPES.contains(&item_type) {
                return "agent".to_string();
            }
        }
    }

    "agent".to_string()
}

/// Drops thinking config the OpenAI wire cannot carry and clears a
/// reasoning effort sent at a model that does not reason.
fn normalize_thinking(body: &mut Value, model: &str) {
    if let Some(map) = body.as_object_mut() {
        map.remove("thinking");
        if map.contains_key("reasoning_effort") && thinking_budget_to_effort(model, -1).is_none() {
            map.remove("reasoning_effort");
        }
    }
}

fn validate_thinking(body: &Value) -> Result<(), ExecuteError> {
    match body.get("reasoning_effort") {
        None => Ok(()),
        Some(Value::String(effort)) if KNOWN_EFFORTS.contains(&effort.as_str()) => Ok(()),
        Some(other) => Err(ExecuteError::ThinkingConfigInvalid(format!(
            "unsupported reasoning_effort {other}"
        ))),
    }
}

/// Per-model payload shaping keyed by (model glob, "openai"): defaults fill
/// unset fields, overrides always win.
fn apply_payload_rules(body: &mut Value, rules: &[PayloadRule], model: &str) {
    let Some(map) = body.as_object_mut() else {
        return;
    };
    for rule in rules {
        if rule.dialect != "openai" || !match_model(&rule.model_pattern, model) {
            continue;
        }
        for (key, value) in &rule.defaults {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        for (key, value) in &rule.overrides {
            map.insert(key.clone(), value.clone());
        }
    }
}

/// Copilot rejects `max_tokens`, never stores conversations, and prompt
/// caching wants the first two system and last two non-system messages
/// marked.
fn apply_copilot_body_optimizations(body: &mut Value) {
    let Some(map) = body.as_object_mut() else {
        return;
    };
    map.remove("max_tokens");
    map.insert("store".to_string(), Value::Bool(false));
    apply_cache_control(map);
}

fn apply_cache_control(map: &mut Map<String, Value>) {
    let Some(messages) = map.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };
    if messages.is_empty() {
        return;
    }

    let mut marked: Vec<usize> = Vec::new();
    let mut system_seen = 0;
    for (index, message) in messages.iter().enumerate() {
        if message.get("role").and_then(Value::as_str) == Some("system") {
            marked.push(index);
            system_seen += 1;
            if system_seen >= 2 {
                break;
            }
        }
    }
    let mut non_system_seen = 0;
    for (index, message) in messages.iter().enumerate().rev() {
        if message.get("role").and_then(Value::as_str) != Some("system") {
            if !marked.contains(&index) {
                marked.push(index);
            }
            non_system_seen += 1;
            if non_system_seen >= 2 {
                break;
            }
        }
    }

    for index in marked {
        if let Some(message) = messages.get_mut(index).and_then(Value::as_object_mut) {
            message.insert(
                "copilot_cache_control".to_string(),
                json!({"type": "ephemeral"}),
            );
        }
    }
}

fn contains_vision_content(body: &Value) -> bool {
    let raw = body.to_string();
    raw.contains("\"image_url\"") || raw.contains("\"image\"")
}

/// Crude token estimate for the count-tokens surface: whole message text at
/// roughly four characters per token.
fn approximate_chat_tokens(body: &Value) -> i64 {
    let mut characters = 0usize;
    if let Some(messages) = body.get("messages").and_then(Value::as_array) {
        for message in messages {
            match message.get("content") {
                Some(Value::String(text)) => characters += text.len(),
                Some(Value::Array(parts)) => {
                    for part in parts {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            characters += text.len();
                        }
                    }
                }
                _ => {}
            }
            characters += 8;
        }
    }
    (characters / 4).max(1) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts_with_metadata(metadata: Map<String, Value>) -> ExecuteOptions {
        ExecuteOptions {
            source_dialect: Dialect::OpenAI,
            original_request: Value::Null,
            metadata,
            api_key: "k".to_string(),
            trace_id: "t".to_string(),
        }
    }

    #[test]
    fn initiator_prefers_the_explicit_override() {
        let mut metadata = Map::new();
        metadata.insert("x_initiator".to_string(), json!("user"));
        let opts = opts_with_metadata(metadata);
        let body = json!({"messages": [{"role": "tool", "content": "x"}]});
        assert_eq!(detect_initiator(&opts, &body), "user");
    }

    #[test]
    fn initiator_follows_last_message_role() {
        let opts = opts_with_metadata(Map::new());
        let user = json!({"messages": [{"role": "user", "content": "hi"}]});
        assert_eq!(detect_initiator(&opts, &user), "user");

        let tool = json!({"messages": [
            {"role": "user", "content": "hi"},
            {"role": "tool", "content": "result"}
        ]});
        assert_eq!(detect_initiator(&opts, &tool), "agent");

        let assistant = json!({"messages": [{"role": "assistant", "content": "x"}]});
        assert_eq!(detect_initiator(&opts, &assistant), "agent");
    }

    #[test]
    fn initiator_inspects_responses_input_items() {
        let opts = opts_with_metadata(Map::new());
        let body = json!({"input": [{"type": "function_call_output", "call_id": "c"}]});
        assert_eq!(detect_initiator(&opts, &body), "agent");

        let assistant = json!({"input": [{"role": "assistant", "content": "x"}]});
        assert_eq!(detect_initiator(&opts, &assistant), "agent");
    }

    #[test]
    fn initiator_defaults_to_agent() {
        let opts = opts_with_metadata(Map::new());
        assert_eq!(detect_initiator(&opts, &json!({})), "agent");
        assert_eq!(detect_initiator(&opts, &json!({"messages": []})), "agent");
    }

    #[test]
    fn body_optimizations_drop_max_tokens_and_mark_cache() {
        let mut body = json!({
            "model": "gpt-4o",
            "max_tokens": 100,
            "messages": [
                {"role": "system", "content": "a"},
                {"role": "user", "content": "b"},
                {"role": "assistant", "content": "c"},
                {"role": "user", "content": "d"}
            ]
        });
        apply_copilot_body_optimizations(&mut body);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["store"], false);
        assert!(body["messages"][0].get("copilot_cache_control").is_some());
        assert!(body["messages"][1].get("copilot_cache_control").is_none());
        assert!(body["messages"][2].get("copilot_cache_control").is_some());
        assert!(body["messages"][3].get("copilot_cache_control").is_some());
    }

    #[test]
    fn invalid_reasoning_effort_is_rejected() {
        assert!(validate_thinking(&json!({"reasoning_effort": "high"})).is_ok());
        assert!(validate_thinking(&json!({})).is_ok());
        assert!(matches!(
            validate_thinking(&json!({"reasoning_effort": "ultra"})),
            Err(ExecuteError::ThinkingConfigInvalid(_))
        ));
        assert!(matches!(
            validate_thinking(&json!({"reasoning_effort": 3})),
            Err(ExecuteError::ThinkingConfigInvalid(_))
        ));
    }

    #[test]
    fn payload_rules_apply_defaults_and_overrides_by_glob() {
        let mut body = json!({"model": "gpt-4o", "temperature": 0.9});
        let rules = vec![PayloadRule {
            model_pattern: "gpt-*".to_string(),
            dialect: "openai".to_string(),
            defaults: serde_json::from_value(json!({"temperature": 0.1, "seed": 7})).unwrap(),
            overrides: serde_json::from_value(json!({"user": "copilot"})).unwrap(),
        }];
        apply_payload_rules(&mut body, &rules, "gpt-4o");
        assert_eq!(body["temperature"], 0.9);
        assert_eq!(body["seed"], 7);
        assert_eq!(body["user"], "copilot");
    }
}
