use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use botkeeper_core::{Bot, BotSettings, BotkeeperResult};
use botkeeper_webtools::BotWebClient;

/// Posts a single "process is up" notification to the configured webhook.
/// Later runs are no-ops, the long interval just keeps the loop cheap.
pub struct StartupNotifierBot {
    client: Arc<BotWebClient>,
    notified: AtomicBool,
}

impl StartupNotifierBot {
    pub const NAME: &'static str = "startup-notifier";

    pub fn new(client: Arc<BotWebClient>) -> Self {
        Self {
            client,
            notified: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Bot for StartupNotifierBot {
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
        if self.notified.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(url) = self.client.destination(Self::NAME) else {
            debug!("No webhook configured for {}, skipping", Self::NAME);
            return Ok(());
        };

        let body = json!({
            "event": "startup",
            "message": "Botkeeper is up and running",
            "timestamp": Utc::now(),
        });
        let _: Option<serde_json::Value> = self
            .client
            .send(Method::POST, Self::NAME, Some(&url), Some(&body), &cancel)
            .await?;

        self.notified.store(true, Ordering::SeqCst);
        info!("Startup notification delivered");
        Ok(())
    }
}
