use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use botkeeper_core::{Bot, BotStatus, BotkeeperError};

use crate::engine::BotEngine;

/// Supervision loop for a single bot. Runs until the cancellation token
/// fires, the bot is disabled, or the crash count exceeds the failure gate.
pub(crate) async fn supervise(engine: BotEngine, bot: Arc<dyn Bot>, cancel: CancellationToken) {
    let name = bot.name().to_string();
    let settings = engine.settings_snapshot(&name).await;

    let mut state = match engine.load_or_init_state(&bot, &settings).await {
        Ok(state) => state,
        Err(e) => {
            error!("Supervision of bot {name} aborted, cannot load state: {e}");
            engine.deregister_loop(&name).await;
            return;
        }
    };

    loop {
        if !settings.enabled {
            state.status = BotStatus::Disabled;
            persist(&engine, &bot, &state).await;
            info!("Bot {name} is disabled, parking until re-enabled");
            cancel.cancelled().await;
            break;
        }

        if state.crash_count >= settings.max_failures {
            state.status = BotStatus::PermanentlyStopped;
            persist(&engine, &bot, &state).await;
            warn!(
                "Bot {name} exceeded max failures ({}), permanently stopped",
                settings.max_failures
            );
            cancel.cancelled().await;
            break;
        }

        state.status = BotStatus::Running;
        persist(&engine, &bot, &state).await;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                state.status = BotStatus::Stopped;
                persist(&engine, &bot, &state).await;
                info!("Bot {name} stopped");
                break;
            }
            res = bot.run(cancel.child_token()) => res,
        };

        match outcome {
            Ok(()) => {
                let interval = settings.effective_run_interval();
                state.status = BotStatus::Idle;
                state.crash_count = 0;
                state.next_run_utc = Some(
                    Utc::now()
                        + chrono::Duration::from_std(interval)
                            .unwrap_or_else(|_| chrono::Duration::seconds(60)),
                );
                persist(&engine, &bot, &state).await;

                tokio::select! {
                    _ = cancel.cancelled() => {
                        state.status = BotStatus::Stopped;
                        persist(&engine, &bot, &state).await;
                        info!("Bot {name} stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            Err(BotkeeperError::Cancelled) => {
                state.status = BotStatus::Stopped;
                persist(&engine, &bot, &state).await;
                info!("Bot {name} stopped mid-run");
                break;
            }
            Err(e) => {
                state.crash_count += 1;
                state.status = BotStatus::Crashed;
                persist(&engine, &bot, &state).await;
                warn!(
                    "Bot {name} crashed ({}/{}): {e}",
                    state.crash_count, settings.max_failures
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        state.status = BotStatus::Stopped;
                        persist(&engine, &bot, &state).await;
                        break;
                    }
                    _ = tokio::time::sleep(settings.restart_delay) => {}
                }
            }
        }
    }

    engine.deregister_loop(&name).await;
}

async fn persist(
    engine: &BotEngine,
    bot: &Arc<dyn Bot>,
    state: &botkeeper_core::BotRuntimeState,
) {
    if let Err(e) = engine.persist_state(bot, state).await {
        error!("Failed to persist state of bot {}: {e}", bot.name());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use botkeeper_core::{
        Bot, BotSettings, BotStatus, BotkeeperError, BotkeeperResult, StorageKind,
    };
    use botkeeper_datastore::{DataAccess, MemoryStore};

    use crate::BotEngine;

    /// Bot whose first `fail_times` runs return an error and whose later
    /// runs succeed. Each run completes quickly so tests stay fast.
    struct ScriptedBot {
        name: String,
        fail_times: u32,
        runs: AtomicU32,
        settings: BotSettings,
    }

    impl ScriptedBot {
        fn new(name: &str, fail_times: u32, settings: BotSettings) -> Arc<dyn Bot> {
            Arc::new(Self {
                name: name.to_string(),
                fail_times,
                runs: AtomicU32::new(0),
                settings,
            })
        }
    }

    #[async_trait]
    impl Bot for ScriptedBot {
        fn name(&self) -> &str {
            &self.name
        }

        fn settings(&self) -> BotSettings {
            self.settings.clone()
        }

        fn state_storage(&self) -> StorageKind {
            StorageKind::InMemory
        }

        async fn run(&self, _cancel: CancellationToken) -> BotkeeperResult<()> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.fail_times {
                Err(BotkeeperError::execution_error("scripted failure"))
            } else {
                Ok(())
            }
        }
    }

    fn fast_settings(max_failures: u32) -> BotSettings {
        BotSettings {
            enabled: true,
            run_interval: Some(Duration::from_millis(30)),
            max_failures,
            restart_delay: Duration::from_millis(5),
        }
    }

    fn engine() -> Arc<BotEngine> {
        let data = DataAccess::new(Arc::new(MemoryStore::new()), None, StorageKind::InMemory);
        Arc::new(BotEngine::new(data, CancellationToken::new()))
    }

    async fn wait_for_status(engine: &Arc<BotEngine>, name: &str, expected: BotStatus) {
        for _ in 0..200 {
            if let Some(report) = engine.status(name).await {
                if report.status == expected {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let got = engine.status(name).await.map(|r| r.status);
        panic!("bot {name} never reached {expected:?}, last seen {got:?}");
    }

    #[tokio::test]
    async fn test_crash_gate_permanently_stops_and_reset_recovers() {
        let engine = engine();
        let bot = ScriptedBot::new("flaky", 3, fast_settings(3));
        engine.register_all(vec![bot]).await;

        let started = engine.start("flaky").await;
        assert!(started.success);
        wait_for_status(&engine, "flaky", BotStatus::PermanentlyStopped).await;

        let report = engine.status("flaky").await.unwrap();
        assert_eq!(report.crash_count, 3);
        assert!(!engine.start("flaky").await.success);

        // reset clears the crash count and drops the parked loop
        assert!(engine.reset_state("flaky").await.success);
        let report = engine.status("flaky").await.unwrap();
        assert_eq!(report.crash_count, 0);
        assert_eq!(report.status, BotStatus::Idle);
        assert!(!engine.loop_registered("flaky").await);

        // the reset bot must be startable, not blocked by a stale loop
        let restarted = engine.start("flaky").await;
        assert!(
            restarted.success,
            "start after reset failed: {:?}",
            restarted.reason
        );
        wait_for_status(&engine, "flaky", BotStatus::Idle).await;
    }

    #[tokio::test]
    async fn test_enable_rejects_crashed_bot_with_live_loop() {
        let engine = engine();
        let mut settings = fast_settings(5);
        settings.restart_delay = Duration::from_millis(500);
        let bot = ScriptedBot::new("wobbly", 10, settings);
        engine.register_all(vec![bot]).await;

        assert!(engine.start("wobbly").await.success);
        wait_for_status(&engine, "wobbly", BotStatus::Crashed).await;

        // the loop is alive in its restart delay and the settings flag is
        // still on, so enable must refuse instead of racing the loop
        assert!(!engine.enable("wobbly").await.success);
        assert!(engine.loop_registered("wobbly").await);
    }

    #[tokio::test]
    async fn test_start_twice_fails_while_running() {
        let engine = engine();
        let bot = ScriptedBot::new("steady", 0, fast_settings(3));
        engine.register_all(vec![bot]).await;

        assert!(engine.start("steady").await.success);
        wait_for_status(&engine, "steady", BotStatus::Idle).await;

        let second = engine.start("steady").await;
        assert!(!second.success);
    }

    #[tokio::test]
    async fn test_stop_then_start_round_trip() {
        let engine = engine();
        let bot = ScriptedBot::new("worker", 0, fast_settings(3));
        engine.register_all(vec![bot]).await;

        assert!(engine.start("worker").await.success);
        wait_for_status(&engine, "worker", BotStatus::Idle).await;

        assert!(engine.stop("worker").await.success);
        wait_for_status(&engine, "worker", BotStatus::Stopped).await;
        assert!(!engine.loop_registered("worker").await);

        assert!(engine.start("worker").await.success);
        wait_for_status(&engine, "worker", BotStatus::Idle).await;
    }

    #[tokio::test]
    async fn test_successful_run_resets_crash_count() {
        let engine = engine();
        let bot = ScriptedBot::new("healer", 2, fast_settings(5));
        engine.register_all(vec![bot]).await;

        assert!(engine.start("healer").await.success);
        wait_for_status(&engine, "healer", BotStatus::Idle).await;

        let report = engine.status("healer").await.unwrap();
        assert_eq!(report.crash_count, 0);
        assert!(report.next_run.is_some());
    }

    #[tokio::test]
    async fn test_disable_parks_and_enable_restarts() {
        let engine = engine();
        let bot = ScriptedBot::new("toggle", 0, fast_settings(3));
        engine.register_all(vec![bot]).await;

        assert!(engine.start("toggle").await.success);
        wait_for_status(&engine, "toggle", BotStatus::Idle).await;

        assert!(engine.disable("toggle").await.success);
        wait_for_status(&engine, "toggle", BotStatus::Disabled).await;
        assert!(!engine.disable("toggle").await.success);
        assert!(!engine.start("toggle").await.success);

        assert!(engine.enable("toggle").await.success);
        wait_for_status(&engine, "toggle", BotStatus::Idle).await;
        assert!(!engine.enable("toggle").await.success);
    }

    #[tokio::test]
    async fn test_restart_recovers_permanently_stopped_bot() {
        let engine = engine();
        let bot = ScriptedBot::new("phoenix", 3, fast_settings(3));
        engine.register_all(vec![bot]).await;

        assert!(engine.start("phoenix").await.success);
        wait_for_status(&engine, "phoenix", BotStatus::PermanentlyStopped).await;

        assert!(engine.restart("phoenix").await.success);
        wait_for_status(&engine, "phoenix", BotStatus::Idle).await;
        let report = engine.status("phoenix").await.unwrap();
        assert_eq!(report.crash_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_bot_is_rejected_everywhere() {
        let engine = engine();
        engine
            .register_all(vec![ScriptedBot::new("known", 0, fast_settings(3))])
            .await;

        assert!(!engine.start("missing").await.success);
        assert!(!engine.stop("missing").await.success);
        assert!(!engine.restart("missing").await.success);
        assert!(!engine.enable("missing").await.success);
        assert!(!engine.disable("missing").await.success);
        assert!(!engine.reset_state("missing").await.success);
        assert!(engine.status("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let engine = engine();
        engine
            .register_all(vec![ScriptedBot::new("CamelBot", 0, fast_settings(3))])
            .await;

        assert!(engine.status("camelbot").await.is_some());
        assert!(engine.start("CAMELBOT").await.success);
        wait_for_status(&engine, "camelbot", BotStatus::Idle).await;
    }

    #[tokio::test]
    async fn test_full_report_lists_every_bot() {
        let engine = engine();
        engine
            .register_all(vec![
                ScriptedBot::new("alpha", 0, fast_settings(3)),
                ScriptedBot::new("beta", 0, BotSettings {
                    enabled: false,
                    ..fast_settings(3)
                }),
            ])
            .await;

        let statuses = engine.list_statuses().await;
        assert_eq!(statuses.len(), 2);
        let beta = statuses.iter().find(|s| s.name == "beta").unwrap();
        assert_eq!(beta.status, BotStatus::Disabled);
    }
}
