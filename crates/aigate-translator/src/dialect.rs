use std::fmt;

/// Wire format identifier. The set is closed; unknown names fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    OpenAI,
    OpenAIResponses,
    Anthropic,
    Gemini,
    GeminiCli,
    Codex,
    Antigravity,
    Claude,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dialect {0:?}")]
pub struct UnknownDialect(pub String);

impl Dialect {
    pub fn parse_name(name: &str) -> Result<Self, UnknownDialect> {
        match name {
            "openai" => Ok(Dialect::OpenAI),
            "openai-responses" => Ok(Dialect::OpenAIResponses),
            "anthropic" => Ok(Dialect::Anthropic),
            "gemini" => Ok(Dialect::Gemini),
            "gemini-cli" => Ok(Dialect::GeminiCli),
            "codex" => Ok(Dialect::Codex),
            "antigravity" => Ok(Dialect::Antigravity),
            "claude" => Ok(Dialect::Claude),
            other => Err(UnknownDialect(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::OpenAI => "openai",
            Dialect::OpenAIResponses => "openai-responses",
            Dialect::Anthropic => "anthropic",
            Dialect::Gemini => "gemini",
            Dialect::GeminiCli => "gemini-cli",
            Dialect::Codex => "codex",
            Dialect::Antigravity => "antigravity",
            Dialect::Claude => "claude",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
