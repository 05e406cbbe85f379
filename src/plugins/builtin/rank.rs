use std::sync::Arc;

use crate::application::errors::ModuleError;
use crate::domain::entities::{Command, HandlerResult, Invocation};
use crate::domain::traits::Ledger;
use crate::infrastructure::logging::LogSink;
use crate::plugins::{CommandModule, ModuleEnv, Registrar};

/// A rung of the rank ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    pub title: &'static str,
    /// Highest balance that still earns this rank, `None` for the top rung
    pub up_to: Option<u64>,
    pub remark: &'static str,
}

pub const LADDER: &[Rank] = &[
    Rank { title: "newbe", up_to: Some(100), remark: "Welcome in the Chat! ❤️" },
    Rank { title: "novice", up_to: Some(500), remark: "Thanks for showing up! 🥳" },
    Rank { title: "watcher", up_to: Some(1_000), remark: "Thanks for actually Watching! 😊" },
    Rank { title: "Viewer", up_to: Some(2_000), remark: "Someone seems to actually like my Stream 📺" },
    Rank { title: "master", up_to: Some(5_000), remark: "Playing Ranked now huh?" },
    Rank { title: "elite", up_to: Some(7_500), remark: "Going into E-Sports now it seems like? 🏆" },
    Rank { title: "Legend", up_to: Some(10_000), remark: "You are on top! but maybe it goes higher ; )" },
    Rank { title: "Jobless", up_to: None, remark: "I dont think I have to say more... you are CRAZY!" },
];

pub fn rank_for(points: u64) -> &'static Rank {
    LADDER
        .iter()
        .find(|rank| rank.up_to.map_or(true, |limit| points <= limit))
        .unwrap_or(&LADDER[LADDER.len() - 1])
}

async fn rank(ctx: Invocation, ledger: Arc<dyn Ledger>, logs: LogSink) -> HandlerResult {
    let points = ledger.get(&ctx.author.ledger_key()).await?;
    let rank = rank_for(points);
    ctx.reply(format!(
        "{} rank is \"{}\". {}",
        ctx.author.name, rank.title, rank.remark
    ))
    .await?;
    logs.info(format!(
        "[RANK] Command executed by {} in #{}",
        ctx.author.name, ctx.channel
    ));
    Ok(())
}

async fn ranks(ctx: Invocation) -> HandlerResult {
    let titles: Vec<String> = LADDER.iter().map(|r| format!("\"{}\"", r.title)).collect();
    ctx.reply(format!("There are the following Ranks: {} Good Luck!", titles.join(", ")))
        .await?;
    Ok(())
}

pub struct RankModule;

impl CommandModule for RankModule {
    fn setup(&mut self, registrar: &mut Registrar<'_>, env: &ModuleEnv) -> Result<(), ModuleError> {
        let ledger = env.ledger.clone();
        let logs = env.logs.clone();
        registrar.register(
            Command::new("rank")
                .with_description("Show your rank")
                .with_handler(move |ctx| rank(ctx, ledger.clone(), logs.clone())),
        )?;

        registrar.register(
            Command::new("ranks")
                .with_description("List every rank")
                .with_handler(ranks),
        )
    }
}
