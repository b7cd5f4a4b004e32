//! Anthropic Messages <-> OpenAI Chat Completions.
//!
//! Requests translate Anthropic payloads into chat-completions form;
//! responses translate the upstream chat payloads back into Anthropic
//! messages and SSE events. The `claude` tag speaks the same wire and
//! registers the same triple.

pub mod request;
pub mod response;
pub mod stream;

use crate::dialect::Dialect;
use crate::registry::{Registry, RegistryError, Triple};
use crate::usage;

pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    let triple = Triple {
        request: request::transform_request,
        stream_response: stream::transform_stream,
        non_stream_response: response::transform_response,
        token_count: Some(usage::openai_usage),
    };
    registry.register(Dialect::Anthropic, Dialect::OpenAI, triple.clone())?;
    registry.register(Dialect::Claude, Dialect::OpenAI, triple)?;
    Ok(())
}
