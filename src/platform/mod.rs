pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// A message received from the chat platform
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Username of the sender, empty when the platform has none
    pub user_name: String,
    /// Chat the reply is addressed to
    pub chat_id: i64,
    /// The message text, absent for media-only messages
    pub text: Option<String>,
}

/// One update pulled from the platform. Updates that are not messages
/// (edits, callbacks, membership changes) carry `None`.
pub type InboundEvent = Option<IncomingMessage>;

/// Outbound side of the platform.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}
