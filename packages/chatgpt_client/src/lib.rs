//! ChatGPT Client - session-cookie access to the ChatGPT web backend
//!
//! This crate authenticates once with a clearance token and a session token,
//! then opens conversations and sends messages through them. It knows nothing
//! about WebSockets or relaying; callers hold the conversation handles.
//!
//! # Example
//!
//! ```no_run
//! use chatgpt_client::{ChatBackend, ChatGptClient, ClientOptions, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chatgpt_client::ChatError> {
//!     let credentials = Credentials::new("cf-clearance", "session-token");
//!     let client = ChatGptClient::authenticate(credentials, ClientOptions::default()).await?;
//!
//!     let mut conversation = client.open_conversation().await?;
//!     let reply = client.send_message(&mut conversation, "hello").await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

mod backend;
mod client;
mod conversation;
mod credentials;
mod error;
pub mod sse;

pub use backend::ChatBackend;
pub use client::{
    ChatGptClient, ClientOptions, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT,
};
pub use conversation::{Conversation, ConversationId};
pub use credentials::{Credentials, DEFAULT_USER_AGENT};
pub use error::ChatError;
