//! Conversion modules, one per registered dialect pair. Each module owns a
//! `register` function the composition root calls while assembling the
//! registry.

pub mod anthropic2openai;
pub mod antigravity2openai;
pub mod codex2openai;
pub mod gemini2openai;
pub mod gemini_cli2openai;
pub mod passthrough;
pub mod responses2openai;
