use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use botkeeper_core::{
    ActionResult, Bot, BotRuntimeState, BotSettings, BotStatus, BotStatusReport, BotkeeperResult,
};
use botkeeper_datastore::{DataAccess, JsonStore};

use crate::supervisor;

const BOT_NOT_FOUND: &str = "Bot could not be found.";
const SETTINGS_NAMESPACE: &str = "settings";
const RUNTIME_NAMESPACE: &str = "runtime";

/// Status/crash-count snapshot used by the full report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStatusSummary {
    pub name: String,
    pub status: BotStatus,
    pub crash_count: u32,
}

struct EngineInner {
    bots: RwLock<Vec<Arc<dyn Bot>>>,
    data_access: DataAccess,
    settings_store: JsonStore<BotSettings>,
    settings: RwLock<HashMap<String, BotSettings>>,
    runtime_states: RwLock<HashMap<String, BotRuntimeState>>,
    cancels: Mutex<HashMap<String, CancellationToken>>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    root_cancel: CancellationToken,
}

/// Owns every registered bot, one supervision loop per started bot, and the
/// persisted status state machine. Cheap to clone, all clones share state.
///
/// Lookups are case-insensitive on the bot name. Each bot's status is only
/// written by its own loop or by a control operation that stopped the loop
/// first, so writers never race on one key.
#[derive(Clone)]
pub struct BotEngine {
    inner: Arc<EngineInner>,
}

impl BotEngine {
    pub fn new(data_access: DataAccess, root_cancel: CancellationToken) -> Self {
        let settings_store = JsonStore::new(data_access.resolve_default(), SETTINGS_NAMESPACE);
        Self {
            inner: Arc::new(EngineInner {
                bots: RwLock::new(Vec::new()),
                data_access,
                settings_store,
                settings: RwLock::new(HashMap::new()),
                runtime_states: RwLock::new(HashMap::new()),
                cancels: Mutex::new(HashMap::new()),
                tasks: Mutex::new(HashMap::new()),
                root_cancel,
            }),
        }
    }

    /// Registers every bot in the list. A bot whose registration fails is
    /// logged and skipped; it never enters the registry.
    pub async fn register_all(&self, bots: Vec<Arc<dyn Bot>>) {
        info!("Registering bots...");
        for bot in bots {
            let name = bot.name().to_string();
            if let Err(e) = self.register(bot).await {
                error!("Failed to register bot {name}: {e}");
            }
        }
        if self.inner.bots.read().await.is_empty() {
            warn!("No bots registered!");
        }
    }

    async fn register(&self, bot: Arc<dyn Bot>) -> BotkeeperResult<()> {
        let name = bot.name().to_string();

        // persisted settings win over the bot's compiled-in defaults
        let settings = match self.inner.settings_store.get(&name).await? {
            Some(persisted) => persisted,
            None => {
                let defaults = bot.settings();
                self.inner.settings_store.set(&name, &defaults).await?;
                defaults
            }
        };

        let mut state = self.load_or_init_state(&bot, &settings).await?;
        state.status = if settings.enabled {
            BotStatus::Idle
        } else {
            BotStatus::Disabled
        };

        self.inner
            .settings
            .write()
            .await
            .insert(name.clone(), settings);
        self.inner
            .runtime_states
            .write()
            .await
            .insert(name.clone(), state);
        self.inner.bots.write().await.push(bot);

        info!("Registered bot {name}");
        Ok(())
    }

    /// Starts every bot whose initial status is `Idle`, then parks until the
    /// root cancellation fires.
    pub async fn run(&self) {
        let bots = self.inner.bots.read().await.clone();
        for bot in bots {
            let status = self.current_status(bot.name()).await;
            if status == BotStatus::Idle {
                let result = self.start(bot.name()).await;
                if !result.success {
                    warn!(
                        "Autostart of bot {} skipped: {}",
                        bot.name(),
                        result.reason.unwrap_or_default()
                    );
                }
            }
        }

        self.inner.root_cancel.cancelled().await;
        info!("Bot engine cancelled");
    }

    pub async fn start(&self, name: &str) -> ActionResult {
        let Some(bot) = self.find_bot(name).await else {
            return ActionResult::fail(BOT_NOT_FOUND);
        };
        let name = bot.name().to_string();

        match self.current_status(&name).await {
            BotStatus::Running => return ActionResult::fail("Bot is already running"),
            BotStatus::PermanentlyStopped => {
                return ActionResult::fail(
                    "Bot is permanently stopped due to exceeding max failures",
                )
            }
            BotStatus::Disabled => return ActionResult::fail("Bot is currently disabled"),
            _ => {}
        }

        let cancel = self.inner.root_cancel.child_token();
        {
            let mut cancels = self.inner.cancels.lock().await;
            if cancels.contains_key(&name) {
                return ActionResult::fail("A supervision loop is already registered for this bot");
            }
            cancels.insert(name.clone(), cancel.clone());
        }

        let handle = tokio::spawn(supervisor::supervise(self.clone(), bot, cancel));
        self.inner.tasks.lock().await.insert(name.clone(), handle);

        info!("Supervision loop started for bot {name}");
        ActionResult::ok()
    }

    pub async fn stop(&self, name: &str) -> ActionResult {
        let Some(bot) = self.find_bot(name).await else {
            return ActionResult::fail(BOT_NOT_FOUND);
        };
        let name = bot.name().to_string();

        let status = self.current_status(&name).await;
        if status != BotStatus::Running && status != BotStatus::Idle {
            return ActionResult::fail(format!("Stop failed: bot is in status '{status}'"));
        }

        if !self.cancel_loop(&name).await {
            return ActionResult::fail(format!("Bot is not running (status: '{status}')"));
        }

        if let Err(e) = self.transition(&bot, BotStatus::Stopped).await {
            error!("Failed to persist stop of bot {name}: {e}");
        }

        info!("Bot {name} supervision cancelled");
        ActionResult::ok()
    }

    pub async fn enable(&self, name: &str) -> ActionResult {
        let Some(bot) = self.find_bot(name).await else {
            return ActionResult::fail(BOT_NOT_FOUND);
        };
        let name = bot.name().to_string();

        // a crashed or stopped bot is unhealthy, not disabled; its loop may
        // still be live, so only the settings flag decides here
        if self.settings_snapshot(&name).await.enabled {
            return ActionResult::fail("Bot is already enabled");
        }

        if let Err(e) = self.update_enabled(&name, true).await {
            return ActionResult::fail(format!("Failed to persist settings: {e}"));
        }
        if let Err(e) = self.transition(&bot, BotStatus::Idle).await {
            return ActionResult::fail(format!("Failed to persist state: {e}"));
        }

        self.start(&name).await
    }

    /// Tolerant of any non-terminal state: stops a registered loop first,
    /// otherwise just parks the bot.
    pub async fn disable(&self, name: &str) -> ActionResult {
        let Some(bot) = self.find_bot(name).await else {
            return ActionResult::fail(BOT_NOT_FOUND);
        };
        let name = bot.name().to_string();

        match self.current_status(&name).await {
            BotStatus::Disabled => return ActionResult::fail("Bot is already disabled"),
            BotStatus::PermanentlyStopped => {
                return ActionResult::fail(
                    "Bot is permanently stopped; reset or restart it before disabling",
                )
            }
            _ => {}
        }

        self.cancel_loop(&name).await;

        if let Err(e) = self.update_enabled(&name, false).await {
            return ActionResult::fail(format!("Failed to persist settings: {e}"));
        }
        if let Err(e) = self.transition(&bot, BotStatus::Disabled).await {
            return ActionResult::fail(format!("Failed to persist state: {e}"));
        }

        ActionResult::ok()
    }

    /// Stops a live loop (stop failure short-circuits), zeroes the crash
    /// count, and starts the bot again. Works from `Stopped`, `Crashed` and
    /// `PermanentlyStopped` where plain `start` would refuse.
    pub async fn restart(&self, name: &str) -> ActionResult {
        let Some(bot) = self.find_bot(name).await else {
            return ActionResult::fail(BOT_NOT_FOUND);
        };
        let name = bot.name().to_string();

        let status = self.current_status(&name).await;
        if status == BotStatus::Running || status == BotStatus::Idle {
            let stopped = self.stop(&name).await;
            if !stopped.success {
                return stopped;
            }
        } else {
            // a crashed or permanently stopped bot may still have its loop
            // parked on the old token
            self.cancel_loop(&name).await;
        }

        {
            let mut states = self.inner.runtime_states.write().await;
            if let Some(state) = states.get_mut(&name) {
                state.crash_count = 0;
                state.status = BotStatus::Idle;
            }
        }
        let state = self.inner.runtime_states.read().await.get(&name).cloned();
        if let Some(state) = state {
            if let Err(e) = self.persist_state(&bot, &state).await {
                return ActionResult::fail(format!("Failed to persist state: {e}"));
            }
        }

        self.start(&name).await
    }

    /// Deletes persisted runtime state and reinitializes to a startable
    /// `Idle` record, independent of whether the loop is running.
    pub async fn reset_state(&self, name: &str) -> ActionResult {
        let Some(bot) = self.find_bot(name).await else {
            return ActionResult::fail(BOT_NOT_FOUND);
        };
        let name = bot.name().to_string();

        // a permanently stopped or crashed bot still has its loop parked on
        // the old token; drop it so the fresh record is startable
        self.cancel_loop(&name).await;

        let store = self.runtime_store(&bot);
        if let Err(e) = store.delete(&name).await {
            return ActionResult::fail(format!("Failed to delete persisted state: {e}"));
        }

        let fresh = BotRuntimeState {
            bot_name: name.clone(),
            status: BotStatus::Idle,
            crash_count: 0,
            next_run_utc: Some(Utc::now()),
        };
        if let Err(e) = self.persist_state(&bot, &fresh).await {
            return ActionResult::fail(format!("Failed to persist fresh state: {e}"));
        }

        ActionResult::ok_with("Bot runtime state reset successfully")
    }

    pub async fn status(&self, name: &str) -> Option<BotStatusReport> {
        let bot = self.find_bot(name).await?;
        let name = bot.name().to_string();

        let settings = self.settings_snapshot(&name).await;
        let state = self.inner.runtime_states.read().await.get(&name).cloned();
        let status = state
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(BotStatus::Disabled);
        let crash_count = state.as_ref().map(|s| s.crash_count).unwrap_or(0);
        let next_run = state.as_ref().and_then(|s| s.next_run_utc);

        let reason = match status {
            BotStatus::Disabled if !settings.enabled => {
                Some("Bot is disabled in settings".to_string())
            }
            BotStatus::Disabled => Some("Bot is currently disabled".to_string()),
            BotStatus::PermanentlyStopped => Some(format!(
                "Bot exceeded max failures ({}) and is permanently stopped",
                settings.max_failures
            )),
            BotStatus::Crashed => Some(format!(
                "Bot crashed ({crash_count}/{}) and will restart after delay",
                settings.max_failures
            )),
            BotStatus::Idle => match next_run {
                Some(at) if at > Utc::now() => {
                    Some(format!("Bot is idle, next run scheduled at {at}"))
                }
                _ => Some("Bot is idle, waiting for next run interval".to_string()),
            },
            BotStatus::Running => Some("Bot is running".to_string()),
            BotStatus::Stopped => Some("Bot was stopped by an operator".to_string()),
        };

        Some(BotStatusReport {
            name,
            status,
            crash_count,
            settings,
            is_running: status == BotStatus::Running,
            next_run,
            reason,
        })
    }

    pub async fn list_statuses(&self) -> Vec<BotStatusSummary> {
        let bots = self.inner.bots.read().await.clone();
        let states = self.inner.runtime_states.read().await;
        bots.iter()
            .map(|bot| {
                let state = states.get(bot.name());
                BotStatusSummary {
                    name: bot.name().to_string(),
                    status: state.map(|s| s.status).unwrap_or(BotStatus::Disabled),
                    crash_count: state.map(|s| s.crash_count).unwrap_or(0),
                }
            })
            .collect()
    }

    async fn find_bot(&self, name: &str) -> Option<Arc<dyn Bot>> {
        let bots = self.inner.bots.read().await;
        bots.iter()
            .find(|b| b.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    fn runtime_store(&self, bot: &Arc<dyn Bot>) -> JsonStore<BotRuntimeState> {
        JsonStore::new(
            self.inner.data_access.resolve(bot.state_storage()),
            RUNTIME_NAMESPACE,
        )
    }

    pub(crate) async fn settings_snapshot(&self, name: &str) -> BotSettings {
        self.inner
            .settings
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    async fn current_status(&self, name: &str) -> BotStatus {
        self.inner
            .runtime_states
            .read()
            .await
            .get(name)
            .map(|s| s.status)
            .unwrap_or(BotStatus::Disabled)
    }

    /// Reads the persisted record, creating and persisting the initial one
    /// when absent.
    pub(crate) async fn load_or_init_state(
        &self,
        bot: &Arc<dyn Bot>,
        settings: &BotSettings,
    ) -> BotkeeperResult<BotRuntimeState> {
        let store = self.runtime_store(bot);
        if let Some(state) = store.get(bot.name()).await? {
            return Ok(state);
        }

        let state = BotRuntimeState::initial(bot.name(), settings.enabled);
        store.set(bot.name(), &state).await?;
        Ok(state)
    }

    pub(crate) async fn persist_state(
        &self,
        bot: &Arc<dyn Bot>,
        state: &BotRuntimeState,
    ) -> BotkeeperResult<()> {
        let store = self.runtime_store(bot);
        store.set(bot.name(), state).await?;
        self.inner
            .runtime_states
            .write()
            .await
            .insert(bot.name().to_string(), state.clone());
        Ok(())
    }

    async fn transition(&self, bot: &Arc<dyn Bot>, status: BotStatus) -> BotkeeperResult<()> {
        let name = bot.name().to_string();
        let mut state = self
            .inner
            .runtime_states
            .read()
            .await
            .get(&name)
            .cloned()
            .unwrap_or_else(|| BotRuntimeState::initial(&name, true));
        state.status = status;
        self.persist_state(bot, &state).await
    }

    async fn update_enabled(&self, name: &str, enabled: bool) -> BotkeeperResult<()> {
        let mut settings = self.settings_snapshot(name).await;
        settings.enabled = enabled;
        self.inner.settings_store.set(name, &settings).await?;
        self.inner
            .settings
            .write()
            .await
            .insert(name.to_string(), settings);
        Ok(())
    }

    /// Cancels a registered supervision loop and waits for its task to
    /// finish, so the old loop can never race a subsequent `start`. Returns
    /// false when no loop was registered.
    async fn cancel_loop(&self, name: &str) -> bool {
        let Some(cancel) = self.inner.cancels.lock().await.remove(name) else {
            return false;
        };
        cancel.cancel();

        let handle = self.inner.tasks.lock().await.remove(name);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Supervision task for bot {name} panicked: {e}");
            }
        }
        true
    }

    /// Called by the supervision loop on exit so a subsequent `start` is
    /// accepted again.
    pub(crate) async fn deregister_loop(&self, name: &str) {
        self.inner.cancels.lock().await.remove(name);
        self.inner.tasks.lock().await.remove(name);
    }

    #[cfg(test)]
    pub(crate) async fn loop_registered(&self, name: &str) -> bool {
        self.inner.cancels.lock().await.contains_key(name)
    }
}
