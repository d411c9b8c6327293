//! Per-connection conversation slot.

use chatgpt_client::Conversation;

/// Lifecycle of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Initialized,
    Closed,
}

/// Holds at most one conversation handle for a single connection.
///
/// Owned by the connection's router, so it needs no locking.
#[derive(Debug)]
pub struct SessionRegistry {
    conversation: Option<Conversation>,
    closed: bool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            conversation: None,
            closed: false,
        }
    }

    /// Store a handle, dropping whatever was there before.
    pub fn set(&mut self, conversation: Conversation) {
        self.conversation = Some(conversation);
    }

    pub fn get(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.conversation = None;
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed {
            ConnectionState::Closed
        } else if self.conversation.is_some() {
            ConnectionState::Initialized
        } else {
            ConnectionState::Connected
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
