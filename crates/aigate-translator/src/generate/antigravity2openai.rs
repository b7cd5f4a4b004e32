//! Antigravity <-> OpenAI Chat Completions.
//!
//! Antigravity speaks the Gemini protocol inside the same request envelope
//! the Gemini CLI uses, so the conversion is the envelope handling plus the
//! gemini delegation.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::registry::{ParserState, Registry, RegistryError, TranslateContext, Triple};
use crate::usage;

use super::gemini_cli2openai;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        Dialect::Antigravity,
        Dialect::OpenAI,
        Triple {
            request: transform_request,
            stream_response: transform_stream,
            non_stream_response: transform_response,
            token_count: Some(usage::openai_usage),
        },
    )
}

pub fn transform_request(model: &str, payload: &Value, stream: bool) -> Value {
    gemini_cli2openai::transform_request(model, payload, stream)
}

pub fn transform_response(
    ctx: &TranslateContext<'_>,
    payload: &Value,
    state: &mut ParserState,
) -> Value {
    gemini_cli2openai::transform_response(ctx, payload, state)
}

pub fn transform_stream(
    ctx: &TranslateContext<'_>,
    chunk: &str,
    state: &mut ParserState,
) -> Vec<String> {
    gemini_cli2openai::transform_stream(ctx, chunk, state)
}
