//! `coins` and `top` - reading the Elchcoins ledger from chat

use std::sync::Arc;

use crate::application::errors::ModuleError;
use crate::domain::entities::{Command, HandlerResult, Invocation};
use crate::domain::traits::Ledger;
use crate::infrastructure::logging::LogSink;
use crate::plugins::{CommandModule, ModuleEnv, Registrar};

pub const TOP_LIMIT: usize = 3;

pub fn format_top(users: &[(String, u64)]) -> String {
    if users.is_empty() {
        return "No points awarded yet.".to_string();
    }
    let ranking: Vec<String> = users
        .iter()
        .map(|(user, points)| format!("{}: {}", user, points))
        .collect();
    format!("🏆 Top {} User: {}", TOP_LIMIT, ranking.join(" | "))
}

async fn coins(ctx: Invocation, ledger: Arc<dyn Ledger>, logs: LogSink) -> HandlerResult {
    let points = ledger.get(&ctx.author.ledger_key()).await?;
    ctx.reply(format!("{}, you have {} Elchcoins 💰", ctx.author.name, points))
        .await?;
    logs.info(format!(
        "[POINTS] Command executed by {} in #{}",
        ctx.author.name, ctx.channel
    ));
    Ok(())
}

async fn top(ctx: Invocation, ledger: Arc<dyn Ledger>) -> HandlerResult {
    let top = ledger.top(TOP_LIMIT).await?;
    ctx.reply(format_top(&top)).await?;
    Ok(())
}

pub struct PointsModule;

impl CommandModule for PointsModule {
    fn setup(&mut self, registrar: &mut Registrar<'_>, env: &ModuleEnv) -> Result<(), ModuleError> {
        let ledger = env.ledger.clone();
        let logs = env.logs.clone();
        registrar.register(
            Command::new("coins")
                .with_description("Show your Elchcoins")
                .with_handler(move |ctx| coins(ctx, ledger.clone(), logs.clone())),
        )?;

        let ledger = env.ledger.clone();
        registrar.register(
            Command::new("top")
                .with_description("Show the richest chatters")
                .with_handler(move |ctx| top(ctx, ledger.clone())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_lists_users_in_order() {
        let top = vec![("b".to_string(), 30), ("c".to_string(), 20)];
        assert_eq!(format_top(&top), "🏆 Top 3 User: b: 30 | c: 20");
        assert_eq!(format_top(&[]), "No points awarded yet.");
    }
}
