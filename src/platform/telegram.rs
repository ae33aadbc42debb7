use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use teloxide::prelude::*;
use teloxide::types::{Update, UpdateKind};
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::platform::{InboundEvent, IncomingMessage, ReplySink};

/// Build the bot with an HTTP timeout that outlasts the long-poll window.
pub fn build_bot(token: &str, config: &TelegramConfig) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 10))
        .build()
        .context("Failed to build Telegram HTTP client")?;
    Ok(Bot::with_client(token, client))
}

/// Extract the relayable part of a Telegram update.
pub fn incoming_from_update(update: &Update) -> InboundEvent {
    let msg = match &update.kind {
        UpdateKind::Message(msg) => msg,
        _ => return None,
    };

    let user_name = msg
        .from
        .as_ref()
        .and_then(|u| u.username.clone())
        .unwrap_or_default();

    Some(IncomingMessage {
        user_name,
        chat_id: msg.chat.id.0,
        text: msg.text().map(str::to_string),
    })
}

struct PollState {
    bot: Bot,
    offset: i32,
    pending: VecDeque<Update>,
    poll_timeout: u32,
    retry_delay: Duration,
}

/// Long-polling update stream over getUpdates. Never ends: a failed poll is
/// logged and retried after `retry_delay_secs`.
pub fn updates(bot: Bot, config: &TelegramConfig) -> impl Stream<Item = InboundEvent> {
    let state = PollState {
        bot,
        offset: 0,
        pending: VecDeque::new(),
        poll_timeout: config.poll_timeout_secs,
        retry_delay: Duration::from_secs(config.retry_delay_secs),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(update) = state.pending.pop_front() {
                let event = incoming_from_update(&update);
                return Some((event, state));
            }

            match state
                .bot
                .get_updates()
                .offset(state.offset)
                .timeout(state.poll_timeout)
                .await
            {
                Ok(batch) => {
                    if let Some(last) = batch.last() {
                        state.offset = last.id.as_offset();
                    }
                    debug!("Received {} update(s)", batch.len());
                    state.pending.extend(batch);
                }
                Err(e) => {
                    warn!("Failed to poll Telegram updates: {}", e);
                    tokio::time::sleep(state.retry_delay).await;
                }
            }
        }
    })
}

/// Sends replies through the Bot API.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplySink for TelegramSink {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .context("Failed to send Telegram message")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    // Update's deserializer only understands text input, as getUpdates delivers it.
    fn parse(value: serde_json::Value) -> Update {
        serde_json::from_str(&value.to_string()).unwrap()
    }

    fn message_update(text: Option<&str>) -> serde_json::Value {
        let mut message = json!({
            "message_id": 5,
            "date": 1700000000,
            "chat": { "id": 42, "type": "private", "first_name": "Alice", "username": "alice" },
            "from": { "id": 1001, "is_bot": false, "first_name": "Alice", "username": "alice" }
        });
        match text {
            Some(t) => message["text"] = json!(t),
            None => {
                message["photo"] = json!([{
                    "file_id": "f", "file_unique_id": "u", "width": 90, "height": 90
                }])
            }
        }
        json!({ "update_id": 10, "message": message })
    }

    #[test]
    fn test_text_message_is_extracted() {
        let update = parse(message_update(Some("hello")));
        assert!(matches!(update.kind, UpdateKind::Message(_)));
        assert_eq!(
            incoming_from_update(&update),
            Some(IncomingMessage {
                user_name: "alice".to_string(),
                chat_id: 42,
                text: Some("hello".to_string()),
            })
        );
    }

    #[test]
    fn test_non_text_message_has_no_text() {
        let update = parse(message_update(None));
        let incoming = incoming_from_update(&update).unwrap();
        assert_eq!(incoming.chat_id, 42);
        assert_eq!(incoming.text, None);
    }

    #[test]
    fn test_non_message_update_is_empty_event() {
        let update = parse(json!({
            "update_id": 11,
            "edited_message": {
                "message_id": 5,
                "date": 1700000000,
                "edit_date": 1700000100,
                "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                "text": "edited"
            }
        }));
        assert!(matches!(update.kind, UpdateKind::EditedMessage(_)));
        assert_eq!(incoming_from_update(&update), None);
    }

    #[test]
    fn test_missing_username_is_empty() {
        let update = parse(json!({
            "update_id": 12,
            "message": {
                "message_id": 6,
                "date": 1700000000,
                "chat": { "id": -100123, "type": "group", "title": "Team" },
                "from": { "id": 1002, "is_bot": false, "first_name": "Bob" },
                "text": "ping"
            }
        }));
        let incoming = incoming_from_update(&update).unwrap();
        assert_eq!(incoming.user_name, "");
        assert_eq!(incoming.chat_id, -100123);
    }

    #[derive(Clone, Default)]
    struct FakeBotApi {
        calls: Arc<AtomicUsize>,
        offsets: Arc<Mutex<Vec<i64>>>,
    }

    fn api_message(update_id: i64, chat_id: i64, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "date": 1700000000,
                "chat": { "id": chat_id, "type": "private", "first_name": "Alice" },
                "from": { "id": 1001, "is_bot": false, "first_name": "Alice", "username": "alice" },
                "text": text
            }
        })
    }

    /// getUpdates: fails once, then serves 100 and 101, then 102, then nothing.
    async fn handle_get_updates(
        State(api): State<FakeBotApi>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let call = api.calls.fetch_add(1, Ordering::SeqCst);
        api.offsets
            .lock()
            .await
            .push(body["offset"].as_i64().unwrap_or(0));

        let result = match call {
            0 => {
                return Json(json!({
                    "ok": false,
                    "error_code": 500,
                    "description": "Internal Server Error"
                }))
            }
            1 => json!([
                api_message(100, 42, "hello"),
                {
                    "update_id": 101,
                    "edited_message": {
                        "message_id": 100,
                        "date": 1700000000,
                        "edit_date": 1700000100,
                        "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                        "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                        "text": "hello again"
                    }
                }
            ]),
            2 => json!([api_message(102, 7, "x")]),
            _ => json!([]),
        };
        Json(json!({ "ok": true, "result": result }))
    }

    async fn spawn_bot_api(api: FakeBotApi) -> String {
        // teloxide names the method path after its payload type, so accept any path.
        let app = Router::new()
            .fallback(post(handle_get_updates))
            .with_state(api);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_updates_advance_offset_and_survive_poll_errors() {
        let api = FakeBotApi::default();
        let base = spawn_bot_api(api.clone()).await;
        let bot = Bot::new("fake-token").set_api_url(reqwest::Url::parse(&base).unwrap());
        let config = TelegramConfig {
            poll_timeout_secs: 1,
            retry_delay_secs: 0,
        };

        let events: Vec<InboundEvent> = tokio::time::timeout(
            Duration::from_secs(5),
            updates(bot, &config).take(3).collect(),
        )
        .await
        .unwrap();

        let chats: Vec<Option<(i64, Option<String>)>> = events
            .into_iter()
            .map(|e| e.map(|m| (m.chat_id, m.text)))
            .collect();
        assert_eq!(
            chats,
            vec![
                Some((42, Some("hello".to_string()))),
                None,
                Some((7, Some("x".to_string()))),
            ]
        );

        let offsets = api.offsets.lock().await.clone();
        assert_eq!(offsets, vec![0, 0, 102]);
    }
}
