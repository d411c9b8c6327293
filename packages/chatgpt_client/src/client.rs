use std::time::Duration;

use reqwest::header;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::ChatBackend;
use crate::conversation::Conversation;
use crate::credentials::Credentials;
use crate::error::ChatError;
use crate::sse;

pub const DEFAULT_BASE_URL: &str = "https://chat.openai.com";
pub const DEFAULT_MODEL: &str = "text-davinci-002-render";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings that are not secrets.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Scheme and host of the backend, without a trailing slash
    pub base_url: String,
    /// Model name sent with every message
    pub model: String,
    /// Per-request HTTP timeout, `None` to wait indefinitely
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default, rename = "accessToken")]
    access_token: Option<String>,
}

/// Authenticated client for the ChatGPT web backend.
///
/// Immutable after [`ChatGptClient::authenticate`]; share it behind an `Arc`.
pub struct ChatGptClient {
    http: reqwest::Client,
    credentials: Credentials,
    options: ClientOptions,
    /// Fetched once by `authenticate`; never refreshed
    access_token: String,
}

impl std::fmt::Debug for ChatGptClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatGptClient")
            .field("credentials", &self.credentials)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ChatGptClient {
    /// Exchange the session cookies for an access token.
    ///
    /// Fails with [`ChatError::AuthenticationFailed`] when the backend does
    /// not hand out a token for these credentials.
    pub async fn authenticate(
        credentials: Credentials,
        options: ClientOptions,
    ) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatError::from_reqwest)?;

        let access_token = fetch_access_token(&http, &credentials, &options.base_url).await?;
        info!("Authenticated with {}", options.base_url);

        Ok(Self {
            http,
            credentials,
            options,
            access_token,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn conversation_url(&self) -> String {
        format!("{}/backend-api/conversation", self.options.base_url)
    }

    fn message_body(&self, conversation: &Conversation, text: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "action": "next",
            "messages": [{
                "id": Uuid::new_v4().to_string(),
                "role": "user",
                "content": { "content_type": "text", "parts": [text] },
            }],
            "model": self.options.model,
            "parent_message_id": conversation.parent_message_id(),
        });
        if let Some(upstream_id) = conversation.upstream_id() {
            body["conversation_id"] = serde_json::Value::String(upstream_id.to_string());
        }
        body
    }
}

async fn fetch_access_token(
    http: &reqwest::Client,
    credentials: &Credentials,
    base_url: &str,
) -> Result<String, ChatError> {
    let url = format!("{}/api/auth/session", base_url);
    let resp = http
        .get(&url)
        .header(header::COOKIE, credentials.cookie_header())
        .header(header::USER_AGENT, &credentials.user_agent)
        .send()
        .await
        .map_err(ChatError::from_reqwest)?;

    let status = resp.status();
    if !status.is_success() {
        return Err(ChatError::AuthenticationFailed(format!(
            "session endpoint returned HTTP {}",
            status.as_u16()
        )));
    }

    let session: SessionResponse = resp
        .json()
        .await
        .map_err(|e| ChatError::AuthenticationFailed(format!("invalid session response: {e}")))?;

    session
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ChatError::AuthenticationFailed("no access token in session".to_string()))
}

impl ChatBackend for ChatGptClient {
    async fn open_conversation(&self) -> Result<Conversation, ChatError> {
        let conversation = Conversation::new();
        debug!(conversation = %conversation.id(), "Opened conversation");
        Ok(conversation)
    }

    async fn send_message(
        &self,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<String, ChatError> {
        debug!(
            conversation = %conversation.id(),
            len = text.len(),
            "Sending message upstream"
        );

        let resp = self
            .http
            .post(self.conversation_url())
            .bearer_auth(&self.access_token)
            .header(header::COOKIE, self.credentials.cookie_header())
            .header(header::USER_AGENT, &self.credentials.user_agent)
            .header(header::ACCEPT, "text/event-stream")
            .json(&self.message_body(conversation, text))
            .send()
            .await
            .map_err(ChatError::from_reqwest)?;

        let status = resp.status();
        let body = resp.text().await.map_err(ChatError::from_reqwest)?;
        if !status.is_success() {
            let err = ChatError::from_status(status.as_u16(), &body);
            if err.is_token_rejected() {
                error!(
                    status = status.as_u16(),
                    "Upstream rejected the access token; it is not refreshed, restart the relay to re-authenticate"
                );
            } else {
                warn!(conversation = %conversation.id(), kind = err.error_kind(), "Upstream rejected message");
            }
            return Err(err);
        }

        let reply = sse::parse_reply(&body)?;
        conversation.record_reply(reply.conversation_id, reply.message_id);
        Ok(reply.text)
    }
}
