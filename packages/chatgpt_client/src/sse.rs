//! Server-sent-event parsing for conversation replies.
//!
//! The backend streams the reply as `data: <json>` lines, each carrying the
//! cumulative text so far, and ends with `data: [DONE]`.

use serde::Deserialize;
use tracing::debug;

use crate::error::ChatError;

const DONE_MARKER: &str = "[DONE]";

/// Final state of a streamed reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Deserialize)]
struct ReplyEvent {
    #[serde(default)]
    message: Option<ReplyMessage>,
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Option<ReplyContent>,
}

#[derive(Deserialize)]
struct ReplyContent {
    #[serde(default)]
    parts: Vec<String>,
}

/// Collect the payloads of `data:` lines, stopping at the done marker.
pub fn data_payloads(raw: &str) -> Vec<&str> {
    let mut payloads = Vec::new();
    for line in raw.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == DONE_MARKER {
            break;
        }
        if !data.is_empty() {
            payloads.push(data);
        }
    }
    payloads
}

/// Reduce a full event-stream body to the final reply.
///
/// Events that fail to parse are skipped. The last event carrying text wins;
/// ids are taken from the latest event that carries them.
pub fn parse_reply(raw: &str) -> Result<Reply, ChatError> {
    let mut text: Option<String> = None;
    let mut conversation_id = None;
    let mut message_id = None;

    for payload in data_payloads(raw) {
        let event: ReplyEvent = match serde_json::from_str(payload) {
            Ok(e) => e,
            Err(e) => {
                debug!("Skipping unparsable reply event: {}", e);
                continue;
            }
        };

        if let Some(id) = event.conversation_id {
            conversation_id = Some(id);
        }
        if let Some(message) = event.message {
            if let Some(id) = message.id {
                message_id = Some(id);
            }
            if let Some(part) = message
                .content
                .and_then(|c| c.parts.into_iter().next())
                .filter(|p| !p.is_empty())
            {
                text = Some(part);
            }
        }
    }

    match text {
        Some(text) => Ok(Reply {
            text,
            conversation_id,
            message_id,
        }),
        None => Err(ChatError::EmptyReply),
    }
}
