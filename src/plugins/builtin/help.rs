use crate::application::errors::ModuleError;
use crate::domain::entities::{Command, HandlerResult, Invocation};
use crate::infrastructure::logging::LogSink;
use crate::infrastructure::plugins::SharedCommandTable;
use crate::plugins::{CommandModule, ModuleEnv, Registrar};

pub struct HelpModule;

pub fn help_text(prefix: &str, commands: &SharedCommandTable) -> String {
    let names: Vec<String> = commands
        .snapshot()
        .commands()
        .map(|c| format!("{}{}", prefix, c.name))
        .collect();
    format!(
        "❓| Use \"{p}\" as prefix before one of my commands like {p}coins or {p}rank! \
         Commands: {}. Have fun chatting!",
        names.join(", "),
        p = prefix
    )
}

async fn help(ctx: Invocation, text: String, logs: LogSink) -> HandlerResult {
    ctx.reply(text).await?;
    logs.info(format!(
        "[HELP] Command executed by {} in #{}",
        ctx.author.name, ctx.channel
    ));
    Ok(())
}

impl CommandModule for HelpModule {
    fn setup(&mut self, registrar: &mut Registrar<'_>, env: &ModuleEnv) -> Result<(), ModuleError> {
        let commands = env.commands.clone();
        let prefix = env.prefix.clone();
        let logs = env.logs.clone();

        registrar.register(
            Command::new("help")
                .with_description("Explain how to use the bot")
                .with_handler(move |ctx| help(ctx, help_text(&prefix, &commands), logs.clone())),
        )
    }
}
