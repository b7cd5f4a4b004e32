//! Token-usage extraction from response payloads, one reader per dialect.

use serde_json::Value;

use crate::json;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: i64, completion_tokens: i64, total_tokens: i64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// Reads `usage.{prompt_tokens, completion_tokens, total_tokens}` from an
/// OpenAI chat payload (unary response or stream chunk).
pub fn openai_usage(payload: &Value) -> Option<TokenUsage> {
    let usage = payload.get("usage")?;
    if !usage.is_object() {
        return None;
    }
    let prompt = json::i64_field(usage, "prompt_tokens").unwrap_or(0);
    let completion = json::i64_field(usage, "completion_tokens").unwrap_or(0);
    let total = json::i64_field(usage, "total_tokens").unwrap_or(prompt + completion);
    Some(TokenUsage::new(prompt, completion, total))
}

/// Reads `usage.{input_tokens, output_tokens}` from an Anthropic message.
pub fn anthropic_usage(payload: &Value) -> Option<TokenUsage> {
    let usage = payload.get("usage")?;
    if !usage.is_object() {
        return None;
    }
    let prompt = json::i64_field(usage, "input_tokens").unwrap_or(0);
    let completion = json::i64_field(usage, "output_tokens").unwrap_or(0);
    Some(TokenUsage::new(prompt, completion, prompt + completion))
}

/// Reads `usageMetadata` from a Gemini response.
pub fn gemini_usage(payload: &Value) -> Option<TokenUsage> {
    let usage = payload.get("usageMetadata")?;
    if !usage.is_object() {
        return None;
    }
    let prompt = json::i64_field(usage, "promptTokenCount").unwrap_or(0);
    let completion = json::i64_field(usage, "candidatesTokenCount").unwrap_or(0);
    let total = json::i64_field(usage, "totalTokenCount").unwrap_or(prompt + completion);
    Some(TokenUsage::new(prompt, completion, total))
}
