use std::time::Duration;

use chatgpt_client::ChatError;

/// Per-frame failures. Each one becomes an `error` frame on the same
/// connection; none of them close it.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Invalid(String),

    #[error("missing field `message` for action new message")]
    MissingMessage,

    #[error("conversation not initialized")]
    NotInitialized,

    #[error("upstream error: {0}")]
    Upstream(#[from] ChatError),

    #[error("upstream error: no reply within {0:?}")]
    UpstreamTimeout(Duration),
}

impl FrameError {
    /// Short classification string for logs.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid_frame",
            Self::MissingMessage => "missing_message",
            Self::NotInitialized => "not_initialized",
            Self::Upstream(e) => e.error_kind(),
            Self::UpstreamTimeout(_) => "timeout",
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::UpstreamTimeout(_))
    }
}
