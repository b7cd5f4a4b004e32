//! Usage extraction and publication.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use aigate_translator::usage::openai_usage;
use aigate_translator::{sse, TokenUsage};
use aigate_usage::RequestStatistics;

/// Reads the usage object out of a unary OpenAI response body.
pub fn parse_openai_usage(body: &[u8]) -> Option<TokenUsage> {
    let parsed: serde_json::Value = serde_json::from_slice(body).ok()?;
    openai_usage(&parsed)
}

/// Decodes one SSE line and returns usage only when the payload is a JSON
/// object carrying a usage field.
pub fn parse_openai_stream_usage(line: &str) -> Option<TokenUsage> {
    let payload = sse::data_payload(line)?;
    if payload == sse::DONE_CHUNK {
        return None;
    }
    let parsed: serde_json::Value = serde_json::from_str(payload).ok()?;
    openai_usage(&parsed)
}

/// Records one request per (api_key, model) cell, at most once per
/// response, and logs the token detail the upstream reported.
pub struct UsageReporter {
    stats: Arc<RequestStatistics>,
    provider: &'static str,
    api_key: String,
    model: String,
    published: bool,
}

impl UsageReporter {
    pub fn new(
        stats: Arc<RequestStatistics>,
        provider: &'static str,
        api_key: String,
        model: String,
    ) -> Self {
        Self {
            stats,
            provider,
            api_key,
            model,
            published: false,
        }
    }

    pub fn publish(&mut self, detail: Option<TokenUsage>) {
        if self.published {
            return;
        }
        self.published = true;
        self.stats
            .record(&self.api_key, &self.model, 1, OffsetDateTime::now_utc());
        let detail = detail.unwrap_or_default();
        debug!(
            event = "usage.publish",
            provider = self.provider,
            model = %self.model,
            prompt_tokens = detail.prompt_tokens,
            completion_tokens = detail.completion_tokens,
            total_tokens = detail.total_tokens,
        );
    }

    pub fn publish_failure(&self) {
        warn!(
            event = "usage.failure",
            provider = self.provider,
            model = %self.model,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_usage_ignores_non_usage_lines() {
        assert!(parse_openai_stream_usage("event: ping").is_none());
        assert!(parse_openai_stream_usage("data: [DONE]").is_none());
        assert!(parse_openai_stream_usage("data: {\"choices\":[]}").is_none());

        let detail = parse_openai_stream_usage(
            "data: {\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2,\"total_tokens\":5}}",
        )
        .unwrap();
        assert_eq!(detail.total_tokens, 5);
    }

    #[test]
    fn unary_usage_parses_from_bytes() {
        let body = br#"{"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#;
        assert_eq!(parse_openai_usage(body).unwrap().total_tokens, 3);
        assert!(parse_openai_usage(b"not json").is_none());
    }
}
