use bytes::Bytes;

pub type ExecuteResult<T> = Result<T, ExecuteError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecuteError {
    #[error("credential refresh failed: {0}")]
    CredentialRefreshFailed(String),
    #[error("invalid thinking config: {0}")]
    ThinkingConfigInvalid(String),
    /// Non-2xx upstream answer, mirrored back to the caller verbatim.
    #[error("upstream returned status {code}")]
    UpstreamStatus { code: u16, body: Bytes },
    #[error("upstream transport: {0}")]
    Transport(String),
    #[error("missing credential field: {0}")]
    MissingCredentialField(&'static str),
}
