use uuid::Uuid;

/// Locally assigned identity of a conversation handle.
///
/// Every call to `open_conversation` yields a new id, even though the upstream
/// only assigns its own id after the first reply.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conv-{}", self.0)
    }
}

/// Handle to one upstream dialogue.
#[derive(Clone, Debug)]
pub struct Conversation {
    id: ConversationId,
    /// Assigned by the upstream on the first reply
    upstream_id: Option<String>,
    /// Message the next user turn replies to
    parent_message_id: String,
}

impl Conversation {
    /// A fresh dialogue with no upstream history.
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            upstream_id: None,
            parent_message_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn upstream_id(&self) -> Option<&str> {
        self.upstream_id.as_deref()
    }

    pub fn parent_message_id(&self) -> &str {
        &self.parent_message_id
    }

    /// Advance the handle after a completed turn.
    pub fn record_reply(&mut self, upstream_id: Option<String>, message_id: Option<String>) {
        if let Some(upstream_id) = upstream_id {
            self.upstream_id = Some(upstream_id);
        }
        if let Some(message_id) = message_id {
            self.parent_message_id = message_id;
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
