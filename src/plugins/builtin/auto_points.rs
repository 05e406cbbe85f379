//! Periodic Elchcoins for active chatters, plus the follow bonus
//!
//! While loaded, the module credits every chatter seen since the last cycle
//! and then forgets them. Credited users are removed one by one so that
//! chatters arriving during the ledger write are kept for the next cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::application::errors::{ModuleError, StorageError};
use crate::application::lifecycle::CancelToken;
use crate::application::services::ActiveUsers;
use crate::domain::entities::{Command, FollowEvent, HandlerResult, Invocation};
use crate::domain::traits::{ChatTransport, Ledger};
use crate::infrastructure::logging::LogSink;
use crate::plugins::{CommandModule, ModuleEnv, Registrar};

/// Names shown by `autoreward status`
const STATUS_PREVIEW: usize = 10;

/// Credit every active user once and forget them
///
/// Returns how many users were credited. On a storage error nobody is
/// removed, so the same users are retried next cycle.
pub async fn reward_cycle(
    ledger: &dyn Ledger,
    active: &ActiveUsers,
    amount: u64,
) -> Result<usize, StorageError> {
    let users = active.snapshot();
    if users.is_empty() {
        return Ok(0);
    }
    let credited = ledger.add_many(&users, amount).await?;
    active.remove_all(&users);
    Ok(credited)
}

/// Runs reward cycles until cancelled
#[allow(clippy::too_many_arguments)]
pub async fn reward_loop(
    ledger: Arc<dyn Ledger>,
    active: Arc<ActiveUsers>,
    amount: u64,
    interval: Duration,
    retry: Duration,
    logs: LogSink,
    cancel: CancelToken,
    running: Arc<AtomicBool>,
) {
    running.store(true, Ordering::SeqCst);
    tracing::debug!("Auto-reward loop started, every {:?}", interval);

    let mut wait = interval;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        wait = match reward_cycle(ledger.as_ref(), &active, amount).await {
            Ok(0) => {
                logs.info("[AUTO-REWARD] No active users found");
                interval
            }
            Ok(n) => {
                logs.success(format!(
                    "[AUTO-REWARD] Gave {} points to {} active users",
                    amount, n
                ));
                interval
            }
            Err(e) => {
                logs.error(format!("[AUTO-REWARD] Error in reward loop: {}", e));
                retry
            }
        };
    }

    running.store(false, Ordering::SeqCst);
    tracing::debug!("Auto-reward loop stopped");
}

/// Text for `autoreward status`
pub fn status_text(users: &[String]) -> String {
    let mut text = format!("🎁 Auto-Reward Status: {} active users tracked", users.len());
    if !users.is_empty() {
        let shown: Vec<&str> = users.iter().take(STATUS_PREVIEW).map(String::as_str).collect();
        text.push_str(" | Active: ");
        text.push_str(&shown.join(", "));
        if users.len() > STATUS_PREVIEW {
            text.push_str(&format!(" (and {} more...)", users.len() - STATUS_PREVIEW));
        }
    }
    text
}

async fn autoreward(ctx: Invocation, active: Arc<ActiveUsers>, running: Arc<AtomicBool>) -> HandlerResult {
    let action = ctx.arg_list().first().map(|a| a.to_lowercase());
    let reply = match action.as_deref().unwrap_or("status") {
        "status" => status_text(&active.snapshot()),
        "clear" => {
            active.clear();
            "✅ Cleared active users list".to_string()
        }
        "running" => {
            let state = if running.load(Ordering::SeqCst) {
                "running"
            } else {
                "stopped"
            };
            format!("🔄 Auto-reward is {}", state)
        }
        _ => "❌ Unknown action. Use: status, clear, running".to_string(),
    };
    ctx.reply(reply).await?;
    Ok(())
}

async fn follow_bonus(
    event: FollowEvent,
    ledger: Arc<dyn Ledger>,
    transport: Arc<dyn ChatTransport>,
    bonus: u64,
    logs: LogSink,
) -> HandlerResult {
    let follower = &event.follower;
    ledger.add(&follower.ledger_key(), bonus).await?;
    logs.success(format!("[FOLLOW] {} followed, +{} coins", follower.name, bonus));

    let text = format!(
        "🎉 Thanks for the follow, {}! You received {} Coins!",
        follower.display_name(),
        bonus
    );
    for channel in transport.connected_channels() {
        if let Err(e) = transport.send(&channel, &text).await {
            logs.error(format!("[FOLLOW] Could not thank {} in #{}: {}", follower.name, channel, e));
        }
    }
    Ok(())
}

#[derive(Default)]
pub struct AutoPointsModule {
    cancel: Option<CancelToken>,
    running: Arc<AtomicBool>,
}

impl CommandModule for AutoPointsModule {
    fn setup(&mut self, registrar: &mut Registrar<'_>, env: &ModuleEnv) -> Result<(), ModuleError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| ModuleError::Setup {
            module: registrar.module().to_string(),
            reason: format!("no async runtime for the reward loop: {}", e),
        })?;

        let amount = env.setting::<u64>("amount").unwrap_or(env.rewards.amount);
        let interval = env
            .setting::<u64>("interval-secs")
            .map(Duration::from_secs)
            .unwrap_or_else(|| env.rewards.interval());
        let bonus = env.setting::<u64>("follow-bonus").unwrap_or(env.rewards.follow_bonus);

        let active = env.active_users.clone();
        let running = self.running.clone();
        registrar.register(
            Command::new("autoreward")
                .with_description("Inspect the auto-reward loop")
                .with_usage("autoreward [status|clear|running]")
                .with_handler(move |ctx| autoreward(ctx, active.clone(), running.clone())),
        )?;

        let ledger = env.ledger.clone();
        let transport = env.transport.clone();
        let logs = env.logs.clone();
        registrar.on_follow_fn(move |event| {
            follow_bonus(event, ledger.clone(), transport.clone(), bonus, logs.clone())
        });

        let cancel = CancelToken::new();
        handle.spawn(reward_loop(
            env.ledger.clone(),
            env.active_users.clone(),
            amount,
            interval,
            env.rewards.retry_delay(),
            env.logs.clone(),
            cancel.clone(),
            self.running.clone(),
        ));
        self.cancel = Some(cancel);
        tracing::info!(module = %registrar.module(), "Auto-reward every {:?}, {} points", interval, amount);
        Ok(())
    }

    fn cleanup(&mut self, _env: &ModuleEnv) -> Result<(), ModuleError> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::SqliteLedger;

    fn users(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn cycle_credits_and_forgets_active_users() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let active = ActiveUsers::new();
        active.register("alice");
        active.register("Bob");

        let credited = reward_cycle(&ledger, &active, 10).await.unwrap();
        assert_eq!(credited, 2);
        assert!(active.is_empty());
        assert_eq!(ledger.get("alice").await.unwrap(), 10);
        assert_eq!(ledger.get("bob").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn empty_cycle_touches_nothing() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let active = ActiveUsers::new();
        assert_eq!(reward_cycle(&ledger, &active, 10).await.unwrap(), 0);
        assert!(ledger.top(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn loop_rewards_until_cancelled() {
        let ledger: Arc<dyn Ledger> = Arc::new(SqliteLedger::in_memory().unwrap());
        let active = Arc::new(ActiveUsers::new());
        active.register("carol");
        let cancel = CancelToken::new();
        let running = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(reward_loop(
            ledger.clone(),
            active.clone(),
            5,
            Duration::from_millis(20),
            Duration::from_millis(20),
            LogSink::discard(),
            cancel.clone(),
            running.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(running.load(Ordering::SeqCst));
        assert_eq!(ledger.get("carol").await.unwrap(), 5);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn status_lists_at_most_ten_names() {
        assert_eq!(status_text(&[]), "🎁 Auto-Reward Status: 0 active users tracked");
        assert_eq!(
            status_text(&users(&["a", "b"])),
            "🎁 Auto-Reward Status: 2 active users tracked | Active: a, b"
        );

        let many: Vec<String> = (0..12).map(|i| format!("u{:02}", i)).collect();
        let text = status_text(&many);
        assert!(text.starts_with("🎁 Auto-Reward Status: 12 active users tracked"));
        assert!(text.contains("u09"));
        assert!(!text.contains("u10"));
        assert!(text.ends_with("(and 2 more...)"));
    }
}
