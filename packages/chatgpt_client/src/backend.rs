use std::future::Future;

use crate::conversation::Conversation;
use crate::error::ChatError;

/// A conversational service that can open dialogues and answer messages.
///
/// Implementations are shared by every connection of a relay, so they must be
/// usable concurrently through `&self`. Per-dialogue state lives in the
/// [`Conversation`] handle owned by the caller.
pub trait ChatBackend: Send + Sync + 'static {
    /// Start a new dialogue.
    fn open_conversation(&self) -> impl Future<Output = Result<Conversation, ChatError>> + Send;

    /// Send `text` as the next user turn of `conversation` and return the reply.
    ///
    /// On success the handle is advanced so the next call continues the same
    /// dialogue. On failure the handle is left untouched.
    fn send_message(
        &self,
        conversation: &mut Conversation,
        text: &str,
    ) -> impl Future<Output = Result<String, ChatError>> + Send;
}
