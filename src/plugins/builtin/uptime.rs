use std::time::{Duration, Instant};

use crate::application::errors::ModuleError;
use crate::domain::entities::{Command, HandlerResult, Invocation};
use crate::infrastructure::logging::LogSink;
use crate::plugins::{CommandModule, ModuleEnv, Registrar};

/// `Xd Xh Xm Xs`, leading zero units left out
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

async fn uptime(ctx: Invocation, started_at: Instant, logs: LogSink) -> HandlerResult {
    let uptime = format_uptime(started_at.elapsed());
    ctx.reply(format!("⏰ Bot uptime: {}", uptime)).await?;
    logs.info(format!("[UPTIME] Uptime requested by {}", ctx.author.name));
    Ok(())
}

pub struct UptimeModule;

impl CommandModule for UptimeModule {
    fn setup(&mut self, registrar: &mut Registrar<'_>, env: &ModuleEnv) -> Result<(), ModuleError> {
        let started_at = env.started_at;
        let logs = env.logs.clone();
        registrar.register(
            Command::new("uptime")
                .with_description("How long the bot has been running")
                .with_handler(move |ctx| uptime(ctx, started_at, logs.clone())),
        )
    }
}
