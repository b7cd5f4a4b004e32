//! Converter registry.
//!
//! One triple per ordered `(from, to)` dialect pair. Registration happens
//! while the composition root still owns the registry mutably; once it is
//! moved into an `Arc`, lookups are plain `HashMap` reads with no
//! synchronization.

use std::any::Any;
use std::collections::HashMap;

use serde_json::Value;

use crate::dialect::Dialect;
use crate::usage::TokenUsage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("converter already registered for {from} -> {to}")]
    AlreadyRegistered { from: Dialect, to: Dialect },
}

/// Context handed to response converters. `from` is the caller's dialect,
/// `to` the upstream dialect the response arrives in.
pub struct TranslateContext<'a> {
    pub from: Dialect,
    pub to: Dialect,
    pub model: &'a str,
    pub original_request: &'a Value,
    pub translated_request: &'a Value,
}

/// Opaque per-stream state owned by the converter. The caller creates a
/// fresh one per response stream and passes it back on every chunk; the
/// converter stores whatever it needs to reassemble split structures.
#[derive(Default)]
pub struct ParserState(Option<Box<dyn Any + Send>>);

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the typed state, initializing it on first use or when a
    /// previous converter left a different type behind.
    pub fn get_or_default<T: Any + Send + Default>(&mut self) -> &mut T {
        let initialized = matches!(self.0.as_ref(), Some(slot) if slot.is::<T>());
        if !initialized {
            self.0 = Some(Box::<T>::default());
        }
        match self.0.as_mut().and_then(|slot| slot.downcast_mut::<T>()) {
            Some(state) => state,
            None => unreachable!("parser state initialized above"),
        }
    }
}

pub type RequestFn = fn(model: &str, payload: &Value, stream: bool) -> Value;
pub type StreamResponseFn =
    fn(ctx: &TranslateContext<'_>, chunk: &str, state: &mut ParserState) -> Vec<String>;
pub type NonStreamResponseFn =
    fn(ctx: &TranslateContext<'_>, payload: &Value, state: &mut ParserState) -> Value;
pub type TokenCountFn = fn(payload: &Value) -> Option<TokenUsage>;

#[derive(Clone)]
pub struct Triple {
    pub request: RequestFn,
    pub stream_response: StreamResponseFn,
    pub non_stream_response: NonStreamResponseFn,
    pub token_count: Option<TokenCountFn>,
}

#[derive(Default)]
pub struct Registry {
    entries: HashMap<(Dialect, Dialect), Triple>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        from: Dialect,
        to: Dialect,
        triple: Triple,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(&(from, to)) {
            return Err(RegistryError::AlreadyRegistered { from, to });
        }
        self.entries.insert((from, to), triple);
        Ok(())
    }

    pub fn lookup(&self, from: Dialect, to: Dialect) -> Option<&Triple> {
        self.entries.get(&(from, to))
    }

    /// Rewrites a request payload from `from` into `to`. The identity pair
    /// and unregistered pairs both return a clone: the upstream is the
    /// authority for rejecting payloads we cannot rewrite.
    pub fn translate_request(
        &self,
        from: Dialect,
        to: Dialect,
        model: &str,
        payload: &Value,
        stream: bool,
    ) -> Value {
        if from == to {
            return payload.clone();
        }
        match self.lookup(from, to) {
            Some(triple) => (triple.request)(model, payload, stream),
            None => payload.clone(),
        }
    }

    /// Translates one upstream SSE line into zero or more caller-dialect
    /// frames. Call once per line, then once with [`crate::sse::DONE_CHUNK`].
    #[allow(clippy::too_many_arguments)]
    pub fn translate_stream(
        &self,
        to: Dialect,
        from: Dialect,
        model: &str,
        original_request: &Value,
        translated_request: &Value,
        chunk: &str,
        state: &mut ParserState,
    ) -> Vec<String> {
        let ctx = TranslateContext {
            from,
            to,
            model,
            original_request,
            translated_request,
        };
        match self.lookup(from, to) {
            Some(triple) => (triple.stream_response)(&ctx, chunk, state),
            None => Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn translate_non_stream(
        &self,
        to: Dialect,
        from: Dialect,
        model: &str,
        original_request: &Value,
        translated_request: &Value,
        payload: &Value,
        state: &mut ParserState,
    ) -> Value {
        let ctx = TranslateContext {
            from,
            to,
            model,
            original_request,
            translated_request,
        };
        match self.lookup(from, to) {
            Some(triple) => (triple.non_stream_response)(&ctx, payload, state),
            None => payload.clone(),
        }
    }

    pub fn token_count(&self, from: Dialect, to: Dialect, payload: &Value) -> Option<TokenUsage> {
        self.lookup(from, to)
            .and_then(|triple| triple.token_count)
            .and_then(|count| count(payload))
    }
}
