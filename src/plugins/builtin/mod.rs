//! Modules compiled into the binary

pub mod auto_points;
pub mod dice;
pub mod help;
pub mod ping;
pub mod points;
pub mod rank;
pub mod uptime;

pub use auto_points::AutoPointsModule;
pub use dice::DiceModule;
pub use help::HelpModule;
pub use ping::PingModule;
pub use points::PointsModule;
pub use rank::RankModule;
pub use uptime::UptimeModule;

use crate::infrastructure::plugins::ModuleCatalog;

/// Catalog of every built-in module, keyed by manifest stem
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new()
        .with("ping", "Replies with pong", || PingModule)
        .with("dice", "Roll a dice with 2 to 100 sides", || DiceModule)
        .with("help", "Lists the available commands", || HelpModule)
        .with("uptime", "Shows how long the bot has been running", || UptimeModule)
        .with("points", "Elchcoins balance and leaderboard", || PointsModule)
        .with("rank", "Ranks derived from Elchcoins", || RankModule)
        .with(
            "auto_points",
            "Rewards active chatters and new followers",
            AutoPointsModule::default,
        )
}
