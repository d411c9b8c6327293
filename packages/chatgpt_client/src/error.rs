/// Errors returned by the upstream conversation backend.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("rate limited")]
    RateLimited,

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream unreachable: {0}")]
    Unavailable(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("upstream reply contained no text")]
    EmptyReply,
}

/// Longest body excerpt kept in `ChatError::Status`.
const MAX_BODY_EXCERPT: usize = 200;

impl ChatError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            429 => Self::RateLimited,
            _ => Self::Status {
                status,
                body: excerpt(body),
            },
        }
    }

    /// The backend refused the access token. Tokens are never refreshed, so
    /// this persists until the process authenticates again.
    pub fn is_token_rejected(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Short classification string for logs.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::Unauthorized { .. } => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::Status { .. } => "status",
            Self::Unavailable(_) => "unavailable",
            Self::Timeout => "timeout",
            Self::Http(_) => "http",
            Self::Malformed(_) => "malformed",
            Self::EmptyReply => "empty_reply",
        }
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
