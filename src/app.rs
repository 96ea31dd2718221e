use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use botkeeper_api::{serve_http, TelegramSource};
use botkeeper_commands::{
    handlers, CommandAuthorizer, CommandBus, CommandRateLimiter, CommandSource,
};
use botkeeper_core::{AppConfig, Bot, StorageKind};
use botkeeper_datastore::{DataAccess, MemoryStore, SqliteStore, StateStore};
use botkeeper_engine::BotEngine;
use botkeeper_webtools::BotWebClient;

use crate::bots::{RestReminderBot, StartupNotifierBot};

/// Explicitly wired application: stores, engine, pipeline and sources are
/// constructed here and handed their dependencies directly.
pub struct Application {
    config: AppConfig,
    engine: Arc<BotEngine>,
    bus: Arc<CommandBus>,
    root: CancellationToken,
}

impl Application {
    pub async fn new(config: AppConfig, root: CancellationToken) -> Result<Self> {
        let in_memory: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let durable = connect_durable(&config).await?;
        let data_access = DataAccess::new(in_memory, durable, config.engine.state_storage);

        let engine = Arc::new(BotEngine::new(data_access, root.child_token()));

        let web_client = Arc::new(BotWebClient::new(config.http.clone()));
        let bots: Vec<Arc<dyn Bot>> = vec![
            Arc::new(StartupNotifierBot::new(Arc::clone(&web_client))),
            Arc::new(RestReminderBot::new(web_client)),
        ];
        engine.register_all(bots).await;

        let registry = handlers::standard_registry(Arc::clone(&engine), root.clone());
        let authorizer = CommandAuthorizer::new(source_tokens(&config));
        let rate_limiter = CommandRateLimiter::new(
            config.commands.rate_limit_capacity,
            std::time::Duration::from_millis(config.commands.rate_limit_timeout_ms),
        );
        let bus = Arc::new(CommandBus::new(Arc::new(registry), authorizer, rate_limiter));

        Ok(Self {
            config,
            engine,
            bus,
            root,
        })
    }

    /// Starts the engine and every enabled command source, then waits for
    /// all of them to wind down after the root token fires.
    pub async fn run(&self) -> Result<()> {
        let mut tasks = Vec::new();

        {
            let engine = Arc::clone(&self.engine);
            tasks.push(tokio::spawn(async move { engine.run().await }));
        }

        if self.config.api.enabled {
            let bind_address = self.config.api.bind_address.clone();
            let bus = Arc::clone(&self.bus);
            let cancel = self.root.child_token();
            let root = self.root.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = serve_http(&bind_address, bus, cancel).await {
                    error!("HTTP command source terminated: {e}");
                    root.cancel();
                }
            }));
        }

        if self.config.telegram.enabled {
            if let Some(bot_token) = self.config.telegram.bot_token.clone() {
                let source = TelegramSource::new(
                    Arc::clone(&self.bus),
                    self.config.telegram.api_base.clone(),
                    bot_token,
                    self.config.telegram.poll_timeout_seconds,
                );
                let cancel = self.root.child_token();
                tasks.push(tokio::spawn(async move { source.run(cancel).await }));
            }
        }

        info!("Botkeeper started with {} source task(s)", tasks.len());
        self.root.cancelled().await;

        for task in tasks {
            if let Err(e) = task.await {
                warn!("A task ended abnormally during shutdown: {e}");
            }
        }
        info!("All tasks stopped");
        Ok(())
    }
}

async fn connect_durable(config: &AppConfig) -> Result<Option<Arc<dyn StateStore>>> {
    match SqliteStore::connect(&config.engine.database_url).await {
        Ok(store) => Ok(Some(Arc::new(store) as Arc<dyn StateStore>)),
        Err(e) if config.engine.state_storage == StorageKind::Durable => {
            Err(e).context("durable state storage is selected but unavailable")
        }
        Err(e) => {
            warn!(
                "Durable store unavailable ({e}), bots preferring it fall back to in-memory state"
            );
            Ok(None)
        }
    }
}

fn source_tokens(config: &AppConfig) -> HashMap<CommandSource, String> {
    let mut tokens = HashMap::new();
    if let Some(token) = &config.api.auth_token {
        tokens.insert(CommandSource::Http, token.clone());
    }
    if let Some(chat_id) = &config.telegram.allowed_chat_id {
        tokens.insert(CommandSource::Telegram, chat_id.clone());
    }
    tokens
}
