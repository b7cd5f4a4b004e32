//! Wire-dialect translation between chat-completion APIs.
//!
//! Converters re-shape raw JSON payloads between dialects, for requests,
//! streamed responses and unary responses. They never fail: a field that
//! cannot be mapped is dropped, and a payload that cannot be parsed is
//! passed through unchanged so the upstream returns the authoritative
//! error.

pub mod dialect;
pub mod generate;
pub mod json;
pub mod registry;
pub mod sse;
pub mod usage;

pub use dialect::Dialect;
pub use registry::{
    ParserState, Registry, RegistryError, TranslateContext, Triple,
};
pub use usage::TokenUsage;

/// Builds the registry with every built-in conversion, in a fixed order.
/// The composition root calls this once before serving traffic; afterwards
/// the registry is shared read-only.
pub fn builtin_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    generate::anthropic2openai::register(&mut registry)?;
    generate::responses2openai::register(&mut registry)?;
    generate::gemini2openai::register(&mut registry)?;
    generate::gemini_cli2openai::register(&mut registry)?;
    generate::codex2openai::register(&mut registry)?;
    generate::antigravity2openai::register(&mut registry)?;
    generate::passthrough::register(&mut registry)?;
    Ok(registry)
}
