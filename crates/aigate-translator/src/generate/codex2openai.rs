//! Codex <-> OpenAI Chat Completions.
//!
//! Codex speaks the OpenAI Responses wire with mandatory `instructions`;
//! the conversion is the responses delegation.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::registry::{ParserState, Registry, RegistryError, TranslateContext, Triple};
use crate::usage;

use super::responses2openai;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        Dialect::Codex,
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
    responses2openai::request::transform_request(model, payload, stream)
}

pub fn transform_response(
    ctx: &TranslateContext<'_>,
    payload: &Value,
    state: &mut ParserState,
) -> Value {
    responses2openai::response::transform_response(ctx, payload, state)
}

pub fn transform_stream(
    ctx: &TranslateContext<'_>,
    chunk: &str,
    state: &mut ParserState,
) -> Vec<String> {
    responses2openai::stream::transform_stream(ctx, chunk, state)
}
