//! `dice [sides]`, aliases `roll` and `d`

use rand::Rng;

use crate::application::errors::ModuleError;
use crate::domain::entities::{Command, HandlerResult, Invocation};
use crate::infrastructure::logging::LogSink;
use crate::plugins::{CommandModule, ModuleEnv, Registrar};

pub const DEFAULT_SIDES: u32 = 6;
pub const MIN_SIDES: u32 = 2;
pub const MAX_SIDES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidesError {
    NotANumber,
    OutOfRange,
}

/// Trim the argument and drop characters that do not print
pub fn sanitize(raw: &str) -> String {
    raw.trim().chars().filter(|c| is_printable(*c)).collect()
}

fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    // zero-width and directional formatting characters
    !matches!(
        c,
        '\u{00AD}' | '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
    )
}

/// Sides requested by the argument text, defaulting to a six-sided die
pub fn parse_sides(raw: &str) -> Result<u32, SidesError> {
    let cleaned = sanitize(raw);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(DEFAULT_SIDES);
    }

    let sides: i64 = cleaned.parse().map_err(|_| SidesError::NotANumber)?;
    u32::try_from(sides)
        .ok()
        .filter(|s| (MIN_SIDES..=MAX_SIDES).contains(s))
        .ok_or(SidesError::OutOfRange)
}

async fn roll(ctx: Invocation, logs: LogSink) -> HandlerResult {
    let sides = match parse_sides(&ctx.args) {
        Ok(sides) => sides,
        Err(SidesError::OutOfRange) => {
            ctx.reply(format!(
                "🎲 Dice must have between {} and {} sides!",
                MIN_SIDES, MAX_SIDES
            ))
            .await?;
            return Ok(());
        }
        Err(SidesError::NotANumber) => {
            ctx.reply("🎲 Please provide a valid number of sides!").await?;
            return Ok(());
        }
    };

    let result = rand::thread_rng().gen_range(1..=sides);
    ctx.reply(format!(
        "🎲 {} rolled a {} (1-{})",
        ctx.author.display_name(),
        result,
        sides
    ))
    .await?;
    logs.info(format!("[DICE] {} rolled {} on d{}", ctx.author.name, result, sides));
    Ok(())
}

pub struct DiceModule;

impl CommandModule for DiceModule {
    fn setup(&mut self, registrar: &mut Registrar<'_>, env: &ModuleEnv) -> Result<(), ModuleError> {
        let logs = env.logs.clone();
        registrar.register(
            Command::new("dice")
                .with_aliases(["roll", "d"])
                .with_description("Roll a dice")
                .with_usage("dice [sides]")
                .with_handler(move |ctx| roll(ctx, logs.clone())),
        )
    }
}
