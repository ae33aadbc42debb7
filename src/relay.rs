use futures::{Stream, StreamExt};
use tracing::{debug, error, info};

use crate::config::RelayConfig;
use crate::llm::CompletionProvider;
use crate::platform::{InboundEvent, IncomingMessage, ReplySink};

/// What happened to a single inbound event.
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Outcome {
    /// No message, or a message without text. Nothing was sent.
    Skipped,
    /// A reply was delivered.
    Replied { chat_id: i64, text: String },
    /// A reply was attempted and the send failed.
    ReplyFailed { chat_id: i64, text: String },
}

/// Forwards each inbound message to the completion provider and sends the
/// result back to the originating chat. One event at a time, in order.
pub struct Relay<'a, P: ?Sized, S: ?Sized> {
    provider: &'a P,
    sink: &'a S,
    config: RelayConfig,
}

impl<'a, P, S> Relay<'a, P, S>
where
    P: CompletionProvider + ?Sized,
    S: ReplySink + ?Sized,
{
    pub fn new(provider: &'a P, sink: &'a S, config: RelayConfig) -> Self {
        Self {
            provider,
            sink,
            config,
        }
    }

    /// Drain `events` until the stream ends. Every failure is absorbed.
    pub async fn run<E>(&self, events: E)
    where
        E: Stream<Item = InboundEvent>,
    {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            self.handle(event).await;
        }
        info!("Update stream ended, relay stopped");
    }

    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let Some(msg) = event else {
            return Outcome::Skipped;
        };
        self.handle_message(msg).await
    }

    async fn handle_message(&self, msg: IncomingMessage) -> Outcome {
        let text = match msg.text.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => {
                debug!("Skipping message without text in chat {}", msg.chat_id);
                return Outcome::Skipped;
            }
        };

        info!("Request from @{}: {}", msg.user_name, text);

        let reply = self.reply_for(text).await;

        match self.sink.send(msg.chat_id, &reply).await {
            Ok(()) => Outcome::Replied {
                chat_id: msg.chat_id,
                text: reply,
            },
            Err(e) => {
                error!("Failed to send reply to chat {}: {:#}", msg.chat_id, e);
                Outcome::ReplyFailed {
                    chat_id: msg.chat_id,
                    text: reply,
                }
            }
        }
    }

    async fn reply_for(&self, prompt: &str) -> String {
        match self.provider.complete(prompt).await {
            Ok(candidates) => candidates
                .into_iter()
                .next()
                .unwrap_or_else(|| self.config.empty_reply.clone()),
            Err(e) => {
                error!("Completion request failed: {:#}", e);
                self.config.error_reply.clone()
            }
        }
    }
}
