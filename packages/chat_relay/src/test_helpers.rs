use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chatgpt_client::{ChatBackend, ChatError, Conversation, ConversationId};

/// What the next `send_message` call should produce.
pub enum ScriptedReply {
    Text(String),
    Fail(ChatError),
    Delayed(Duration, String),
}

/// In-process backend with canned replies.
///
/// Records every `send_message` call as `(conversation id, text)`. With an
/// empty script it answers `echo: <text>`.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    open_failures: Mutex<VecDeque<ChatError>>,
    sent: Mutex<Vec<(ConversationId, String)>>,
    opened: AtomicU64,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn fail_next_open(&self, err: ChatError) {
        self.open_failures.lock().unwrap().push_back(err);
    }

    /// Number of successful `open_conversation` calls.
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(ConversationId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl ChatBackend for ScriptedBackend {
    async fn open_conversation(&self) -> Result<Conversation, ChatError> {
        let failure = self.open_failures.lock().unwrap().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Conversation::new())
    }

    async fn send_message(
        &self,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<String, ChatError> {
        self.sent
            .lock()
            .unwrap()
            .push((conversation.id(), text.to_string()));
        let scripted = self.replies.lock().unwrap().pop_front();

        let reply = match scripted {
            None => format!("echo: {text}"),
            Some(ScriptedReply::Text(reply)) => reply,
            Some(ScriptedReply::Fail(err)) => return Err(err),
            Some(ScriptedReply::Delayed(delay, reply)) => {
                tokio::time::sleep(delay).await;
                reply
            }
        };

        conversation.record_reply(
            Some(format!("upstream-{}", conversation.id().0)),
            Some(uuid::Uuid::new_v4().to_string()),
        );
        Ok(reply)
    }
}
