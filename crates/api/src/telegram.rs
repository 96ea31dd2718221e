use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use botkeeper_commands::{Command, CommandBus, CommandContext, CommandSource};

use crate::problem::ProblemDocument;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Chat command source: long-polls the Telegram bot API, feeds each text
/// message through the pipeline and replies in the same conversation.
///
/// The chat id doubles as the authorization token for the telegram source.
pub struct TelegramSource {
    http: reqwest::Client,
    bus: Arc<CommandBus>,
    api_base: String,
    bot_token: String,
    poll_timeout_seconds: u64,
}

impl TelegramSource {
    pub fn new(
        bus: Arc<CommandBus>,
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        poll_timeout_seconds: u64,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            bus,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            poll_timeout_seconds,
        }
    }

    /// Runs until the token fires. Poll failures are logged and retried
    /// after a short backoff, they never terminate the source.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Telegram command source polling started");
        let mut offset: i64 = 0;

        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.poll_updates(offset) => res,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(message) = update.message {
                            self.process_message(message).await;
                        }
                    }
                }
                Err(e) => {
                    warn!("Telegram poll failed: {e}");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        info!("Telegram command source stopped");
    }

    async fn poll_updates(&self, offset: i64) -> Result<Vec<Update>, reqwest::Error> {
        let url = format!("{}/bot{}/getUpdates", self.api_base, self.bot_token);
        let response: UpdatesResponse = self
            .http
            .get(&url)
            .query(&[
                ("timeout", self.poll_timeout_seconds.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            debug!("Telegram answered ok=false, treating as empty batch");
        }
        Ok(response.result)
    }

    async fn process_message(&self, message: Message) {
        let chat_id = message.chat.id;
        let Some(text) = message.text else {
            return;
        };
        let mut parts = text.split_whitespace();
        let Some(name) = parts.next() else {
            return;
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        let command = Command::new(name, args, CommandSource::Telegram, chat_id.to_string());
        let correlation_id = Uuid::new_v4().to_string();
        let ctx = CommandContext::new(command, Some(chat_id.to_string()), correlation_id.clone());

        let reply = match self.bus.dispatch(&ctx).await {
            Ok(Some(value)) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
            Ok(None) => "Accepted".to_string(),
            Err(e) => {
                let problem = ProblemDocument::from_error(&e, &correlation_id);
                serde_json::to_string_pretty(&problem)
                    .unwrap_or_else(|_| format!("Error: {e}"))
            }
        };

        if let Err(e) = self.send_reply(chat_id, &reply).await {
            warn!("Failed to send Telegram reply to chat {chat_id}: {e}");
        }
    }

    async fn send_reply(&self, chat_id: i64, text: &str) -> Result<(), reqwest::Error> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        self.http
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
