//! Per-connection message router.
//!
//! Turns one inbound text frame into exactly one outbound frame, calling the
//! upstream backend on the way when the action needs it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chatgpt_client::{ChatBackend, ChatError, Conversation};
use tracing::{debug, warn};

use crate::error::FrameError;
use crate::metrics::RelayMetrics;
use crate::protocol::{Command, InboundFrame, OutboundFrame};
use crate::session::{ConnectionState, SessionRegistry};

/// Routes frames for a single connection. Frames must be fed one at a time.
pub struct MessageRouter<B> {
    backend: Arc<B>,
    registry: SessionRegistry,
    call_timeout: Option<Duration>,
    metrics: Arc<RelayMetrics>,
    connection_id: String,
}

impl<B: ChatBackend> MessageRouter<B> {
    pub fn new(
        backend: Arc<B>,
        call_timeout: Option<Duration>,
        metrics: Arc<RelayMetrics>,
        connection_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            registry: SessionRegistry::new(),
            call_timeout,
            metrics,
            connection_id: connection_id.into(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.registry.state()
    }

    #[cfg(test)]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn close(&mut self) {
        self.registry.close();
    }

    /// Handle one raw text frame. Failures come back as `error` frames.
    pub async fn handle_text(&mut self, raw: &str) -> OutboundFrame {
        let result = self.dispatch(raw).await;
        self.finish(result)
    }

    /// Binary frames carry the same JSON as text frames, encoded as UTF-8.
    pub async fn handle_binary(&mut self, raw: &[u8]) -> OutboundFrame {
        match std::str::from_utf8(raw) {
            Ok(text) => self.handle_text(text).await,
            Err(e) => self.finish(Err(FrameError::Invalid(e.to_string()))),
        }
    }

    fn finish(&self, result: Result<OutboundFrame, FrameError>) -> OutboundFrame {
        match result {
            Ok(frame) => frame,
            Err(err) => {
                if matches!(err, FrameError::Invalid(_)) {
                    self.metrics.decode_error();
                }
                if err.is_upstream() {
                    self.metrics.upstream_error();
                    warn!(
                        conn_id = %self.connection_id,
                        kind = err.error_kind(),
                        "Upstream call failed: {}",
                        err
                    );
                } else {
                    debug!(
                        conn_id = %self.connection_id,
                        kind = err.error_kind(),
                        "Rejected frame: {}",
                        err
                    );
                }
                err.into()
            }
        }
    }

    async fn dispatch(&mut self, raw: &str) -> Result<OutboundFrame, FrameError> {
        let frame = InboundFrame::parse(raw)?;
        match frame.command() {
            Command::InitConversation => self.init_conversation().await,
            Command::NewMessage(Some(text)) => self.new_message(text).await,
            Command::NewMessage(None) => Err(FrameError::MissingMessage),
            Command::Unknown(action) => {
                debug!(conn_id = %self.connection_id, action, "Unknown action");
                Ok(OutboundFrame::unknown_action(action))
            }
        }
    }

    async fn init_conversation(&mut self) -> Result<OutboundFrame, FrameError> {
        let backend = Arc::clone(&self.backend);
        let conversation = self.bounded(backend.open_conversation()).await?;
        debug!(
            conn_id = %self.connection_id,
            conversation = %conversation.id(),
            "Conversation initialized"
        );
        self.registry.set(conversation);
        self.metrics.conversation_opened();
        Ok(OutboundFrame::init_ack())
    }

    async fn new_message(&mut self, text: &str) -> Result<OutboundFrame, FrameError> {
        // Work on a copy so a failed or abandoned call leaves the stored handle as it was.
        let mut conversation: Conversation = self
            .registry
            .get()
            .cloned()
            .ok_or(FrameError::NotInitialized)?;

        let backend = Arc::clone(&self.backend);
        let reply = self
            .bounded(backend.send_message(&mut conversation, text))
            .await?;
        debug!(
            conn_id = %self.connection_id,
            conversation = %conversation.id(),
            reply_len = reply.len(),
            "Relayed message"
        );
        self.registry.set(conversation);
        Ok(OutboundFrame::reply(reply))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ChatError>>,
    ) -> Result<T, FrameError> {
        match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(FrameError::from),
                Err(_) => Err(FrameError::UpstreamTimeout(limit)),
            },
            None => call.await.map_err(FrameError::from),
        }
    }
}
