use crate::application::errors::ModuleError;
use crate::domain::entities::{Command, HandlerResult, Invocation};
use crate::infrastructure::logging::LogSink;
use crate::plugins::{CommandModule, ModuleEnv, Registrar};

pub struct PingModule;

async fn ping(ctx: Invocation, logs: LogSink) -> HandlerResult {
    ctx.reply("🏓 Pong!").await?;
    logs.info(format!(
        "[PING] Command executed by {} in #{}",
        ctx.author.name, ctx.channel
    ));
    Ok(())
}

impl CommandModule for PingModule {
    fn setup(&mut self, registrar: &mut Registrar<'_>, env: &ModuleEnv) -> Result<(), ModuleError> {
        let logs = env.logs.clone();
        registrar.register(
            Command::new("ping")
                .with_description("Check that the bot is alive")
                .with_handler(move |ctx| ping(ctx, logs.clone())),
        )
    }
}
