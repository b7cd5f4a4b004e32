//! Identity triple for OpenAI callers talking to an OpenAI upstream.
//! Requests clone; stream lines re-frame as-is, ending with the standard
//! `data: [DONE]` terminator.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::registry::{ParserState, Registry, RegistryError, TranslateContext, Triple};
use crate::sse;
use crate::usage;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        Dialect::OpenAI,
        Dialect::OpenAI,
        Triple {
            request: transform_request,
            stream_response: transform_stream,
            non_stream_response: transform_response,
            token_count: Some(usage::openai_usage),
        },
    )
}

fn transform_request(_model: &str, payload: &Value, _stream: bool) -> Value {
    payload.clone()
}

fn transform_response(
    _ctx: &TranslateContext<'_>,
    payload: &Value,
    _state: &mut ParserState,
) -> Value {
    payload.clone()
}

fn transform_stream(
    _ctx: &TranslateContext<'_>,
    chunk: &str,
    _state: &mut ParserState,
) -> Vec<String> {
    if sse::is_done(chunk) {
        return vec![sse::done_frame()];
    }
    match sse::data_payload(chunk) {
        Some(payload) if !payload.is_empty() => vec![format!("data: {payload}\n\n")],
        _ => Vec::new(),
    }
}
