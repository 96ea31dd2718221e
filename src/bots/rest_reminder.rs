use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use botkeeper_core::{Bot, BotSettings, BotkeeperResult};
use botkeeper_webtools::BotWebClient;

/// Posts an hourly reminder to step away from the screen.
///
/// Every run is a distinct logical call, so the idempotency key is reset
/// after each delivery; retries within one run still share a key.
pub struct RestReminderBot {
    client: Arc<BotWebClient>,
}

impl RestReminderBot {
    pub const NAME: &'static str = "rest-reminder";

    pub fn new(client: Arc<BotWebClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Bot for RestReminderBot {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn settings(&self) -> BotSettings {
        BotSettings {
            run_interval: Some(Duration::from_secs(3600)),
            ..BotSettings::default()
        }
    }

    async fn run(&self, cancel: CancellationToken) -> BotkeeperResult<()> {
        let Some(url) = self.client.destination(Self::NAME) else {
            debug!("No webhook configured for {}, skipping", Self::NAME);
            return Ok(());
        };

        let body = json!({
            "message": "Time to take a short break and rest your eyes",
            "timestamp": Utc::now(),
        });
        let result: BotkeeperResult<Option<serde_json::Value>> = self
            .client
            .send(Method::POST, Self::NAME, Some(&url), Some(&body), &cancel)
            .await;

        self.client.reset_idempotency_key(Self::NAME, &url).await;
        result.map(|_| ())
    }
}
