//! WebSocket Protocol Types
//!
//! JSON frames exchanged with relay clients.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

pub const ACTION_INIT_CONVERSATION: &str = "init conversation";
pub const ACTION_NEW_MESSAGE: &str = "new message";
pub const ACTION_ERROR: &str = "error";

/// Prefix of the reply to an action the relay does not know.
pub const UNKNOWN_ACTION_PREFIX: &str = "action未定义: ";

/// Frame sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundFrame {
    pub action: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl InboundFrame {
    /// Only JSON objects are frames. A sequence such as `["init conversation"]` is invalid.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| FrameError::Invalid(e.to_string()))?;
        if !value.is_object() {
            return Err(FrameError::Invalid("expected a JSON object".to_string()));
        }
        serde_json::from_value(value).map_err(|e| FrameError::Invalid(e.to_string()))
    }

    pub fn command(&self) -> Command<'_> {
        match self.action.as_str() {
            ACTION_INIT_CONVERSATION => Command::InitConversation,
            ACTION_NEW_MESSAGE => Command::NewMessage(self.message.as_deref()),
            other => Command::Unknown(other),
        }
    }
}

/// What an inbound frame asks the relay to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    InitConversation,
    NewMessage(Option<&'a str>),
    Unknown(&'a str),
}

/// Frame sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundFrame {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OutboundFrame {
    pub fn init_ack() -> Self {
        Self {
            action: ACTION_INIT_CONVERSATION.to_string(),
            message: None,
        }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            action: ACTION_NEW_MESSAGE.to_string(),
            message: Some(text.into()),
        }
    }

    /// The reply keeps the `new message` tag regardless of the action sent.
    pub fn unknown_action(action: &str) -> Self {
        Self::reply(format!("{UNKNOWN_ACTION_PREFIX}{action}"))
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            action: ACTION_ERROR.to_string(),
            message: Some(detail.into()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<FrameError> for OutboundFrame {
    fn from(err: FrameError) -> Self {
        Self::error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_value(frame: &OutboundFrame) -> serde_json::Value {
        serde_json::from_str(&frame.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_init_conversation() {
        let frame = InboundFrame::parse(r#"{"action":"init conversation"}"#).unwrap();
        assert_eq!(frame.command(), Command::InitConversation);
    }

    #[test]
    fn test_init_ignores_message() {
        let frame =
            InboundFrame::parse(r#"{"action":"init conversation","message":"ignored"}"#).unwrap();
        assert_eq!(frame.command(), Command::InitConversation);
    }

    #[test]
    fn test_parse_new_message() {
        let frame = InboundFrame::parse(r#"{"action":"new message","message":"hello"}"#).unwrap();
        assert_eq!(frame.command(), Command::NewMessage(Some("hello")));

        let frame = InboundFrame::parse(r#"{"action":"new message"}"#).unwrap();
        assert_eq!(frame.command(), Command::NewMessage(None));
    }

    #[test]
    fn test_parse_unknown_action() {
        let frame = InboundFrame::parse(r#"{"action":"foo"}"#).unwrap();
        assert_eq!(frame.command(), Command::Unknown("foo"));
    }

    #[test]
    fn test_action_match_is_exact() {
        let frame = InboundFrame::parse(r#"{"action":"Init Conversation"}"#).unwrap();
        assert_eq!(frame.command(), Command::Unknown("Init Conversation"));
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        for raw in [
            "not json",
            "{}",
            r#"{"action":42}"#,
            r#"{"action":null}"#,
            r#"{"action":"new message","message":7}"#,
            r#"["init conversation"]"#,
            r#"["new message","hi"]"#,
            r#""init conversation""#,
            "null",
        ] {
            assert!(
                matches!(InboundFrame::parse(raw), Err(FrameError::Invalid(_))),
                "expected {raw} to be rejected"
            );
        }
    }

    #[test]
    fn test_outbound_shapes() {
        assert_eq!(
            to_value(&OutboundFrame::init_ack()),
            json!({"action": "init conversation"})
        );
        assert_eq!(
            to_value(&OutboundFrame::reply("hi there")),
            json!({"action": "new message", "message": "hi there"})
        );
        assert_eq!(
            to_value(&OutboundFrame::unknown_action("foo")),
            json!({"action": "new message", "message": "action未定义: foo"})
        );
        assert_eq!(
            to_value(&OutboundFrame::error("conversation not initialized")),
            json!({"action": "error", "message": "conversation not initialized"})
        );
    }

    #[test]
    fn test_frame_error_into_outbound() {
        let frame: OutboundFrame = FrameError::NotInitialized.into();
        assert_eq!(frame.action, ACTION_ERROR);
        assert_eq!(frame.message.as_deref(), Some("conversation not initialized"));
    }
}
