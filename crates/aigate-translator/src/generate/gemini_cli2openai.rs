//! Gemini CLI <-> OpenAI Chat Completions.
//!
//! The CLI wire wraps a plain Gemini request in an envelope
//! (`{"model": ..., "project": ..., "request": {...}}`) and expects each
//! response frame wrapped as `{"response": {...}}`. Everything inside the
//! envelope delegates to the gemini conversion.

use serde_json::{json, Value};

use crate::dialect::Dialect;
use crate::json::str_field;
use crate::registry::{ParserState, Registry, RegistryError, TranslateContext, Triple};
use crate::sse;
use crate::usage;

use super::gemini2openai;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        Dialect::GeminiCli,
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
    let inner = match payload.get("request") {
        Some(inner) if inner.is_object() => inner,
        _ => return payload.clone(),
    };
    let model = str_field(payload, "model").unwrap_or(model);
    gemini2openai::request::transform_request(model, inner, stream)
}

pub fn transform_response(
    ctx: &TranslateContext<'_>,
    payload: &Value,
    state: &mut ParserState,
) -> Value {
    let inner = gemini2openai::response::transform_response(ctx, payload, state);
    json!({"response": inner})
}

pub fn transform_stream(
    ctx: &TranslateContext<'_>,
    chunk: &str,
    state: &mut ParserState,
) -> Vec<String> {
    gemini2openai::stream::transform_stream(ctx, chunk, state)
        .into_iter()
        .filter_map(|frame| wrap_frame(&frame))
        .collect()
}

/// Re-frames `data: {...}` as `data: {"response": {...}}`.
fn wrap_frame(frame: &str) -> Option<String> {
    let payload = sse::data_payload(frame.trim_end())?;
    let parsed: Value = serde_json::from_str(payload).ok()?;
    Some(sse::data_frame(&json!({"response": parsed})))
}
