//! Google Gemini generateContent <-> OpenAI Chat Completions.

pub mod request;
pub mod response;
pub mod stream;

use crate::dialect::Dialect;
use crate::registry::{Registry, RegistryError, Triple};
use crate::usage;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        Dialect::Gemini,
        Dialect::OpenAI,
        Triple {
            request: request::transform_request,
            stream_response: stream::transform_stream,
            non_stream_response: response::transform_response,
            token_count: Some(usage::openai_usage),
        },
    )
}
