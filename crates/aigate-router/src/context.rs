//! Request-scoped context assembled by the middleware chain and consumed by
//! the dialect handlers.

use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub api_key: String,
    pub client_ip: String,
    pub trace_id: String,
    /// Buffered request body after model-prefix rewriting.
    pub original_body: Bytes,
    /// Model extracted from the (rewritten) body, when present.
    pub requested_model: Option<String>,
    /// None = unrestricted.
    pub allowed_credentials: Option<Vec<String>>,
    pub allowed_providers: Option<Vec<String>>,
}
