pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Tokens copied from a logged-in browser session.
///
/// The clearance token must have been issued to the same user agent that the
/// client presents, so the user agent travels with the tokens.
#[derive(Clone)]
pub struct Credentials {
    pub clearance_token: String,
    pub session_token: String,
    pub user_agent: String,
}

impl Credentials {
    pub fn new(clearance_token: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            clearance_token: clearance_token.into(),
            session_token: session_token.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Value for the `cookie` header sent with every upstream request.
    pub fn cookie_header(&self) -> String {
        format!(
            "cf_clearance={}; __Secure-next-auth.session-token={}",
            self.clearance_token, self.session_token
        )
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("clearance_token", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_carries_both_tokens() {
        let creds = Credentials::new("clear", "sess");
        assert_eq!(
            creds.cookie_header(),
            "cf_clearance=clear; __Secure-next-auth.session-token=sess"
        );
    }

    #[test]
    fn debug_redacts_tokens() {
        let creds = Credentials::new("secret-clearance", "secret-session");
        let out = format!("{:?}", creds);
        assert!(!out.contains("secret-clearance"));
        assert!(!out.contains("secret-session"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn user_agent_override() {
        let creds = Credentials::new("a", "b").with_user_agent("test-agent/1.0");
        assert_eq!(creds.user_agent, "test-agent/1.0");
        assert_eq!(Credentials::new("a", "b").user_agent, DEFAULT_USER_AGENT);
    }
}
