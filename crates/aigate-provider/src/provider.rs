//! Provider capability surface. Every upstream binding implements the same
//! set: unary execute, streaming execute, token counting and credential
//! refresh.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use aigate_translator::Dialect;

use crate::credential::Credential;
use crate::errors::ExecuteError;

#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub model: String,
    pub payload: Value,
    /// Request-scoped knobs, e.g. `reasoning_effort`.
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub source_dialect: Dialect,
    /// Caller's payload before any middleware rewriting; response
    /// converters receive it for context.
    pub original_request: Value,
    /// Executor hints, e.g. an `x_initiator` override.
    pub metadata: Map<String, Value>,
    pub api_key: String,
    pub trace_id: String,
}

/// One streamed chunk: a caller-dialect SSE frame, or the terminal error.
pub type StreamChunk = Result<Bytes, ExecuteError>;

#[async_trait]
pub trait Provider: Send + Sync {
    fn identifier(&self) -> &'static str;

    async fn execute(
        &self,
        credential: Arc<Credential>,
        request: ExecuteRequest,
        opts: ExecuteOptions,
    ) -> Result<Bytes, ExecuteError>;

    async fn execute_stream(
        &self,
        credential: Arc<Credential>,
        request: ExecuteRequest,
        opts: ExecuteOptions,
    ) -> Result<mpsc::Receiver<StreamChunk>, ExecuteError>;

    async fn count_tokens(
        &self,
        credential: Arc<Credential>,
        request: ExecuteRequest,
        opts: ExecuteOptions,
    ) -> Result<Bytes, ExecuteError>;

    async fn refresh(&self, credential: Arc<Credential>) -> Result<(), ExecuteError>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers
            .insert(provider.identifier().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }
}
