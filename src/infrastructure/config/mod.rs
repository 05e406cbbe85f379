//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::errors::ConfigError;
use crate::domain::entities::{normalize_channel, Role};

/// Bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub credentials: CredentialsConfig,
    pub channels: Vec<String>,
    pub modules: ModulesConfig,
    pub storage: StorageConfig,
    pub rewards: RewardsConfig,
    pub console: ConsoleConfig,
    /// Per-command dispatch policy, keyed by primary command name
    pub commands: BTreeMap<String, CommandPolicy>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    /// Chat nick of the bot, used to recognise echoes
    pub name: String,
    pub id: String,
    pub owner_id: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CredentialsConfig {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ModulesConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    pub database: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RewardsConfig {
    /// Points credited to every active user per cycle
    pub amount: u64,
    pub interval_secs: u64,
    /// Points credited to a new follower
    pub follow_bonus: u64,
    /// Wait after a failed cycle before trying again
    pub retry_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConsoleConfig {
    pub poll_interval_ms: u64,
    pub shutdown_grace_secs: u64,
}

/// Dispatch policy for a single command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CommandPolicy {
    pub enabled: bool,
    /// Per-user cooldown, 0 disables
    pub cooldown_secs: u64,
    pub permission: Role,
    /// Channels the command may run in, empty means all
    pub channels: Vec<String>,
    /// Uses per user for the lifetime of the worker, 0 means unlimited
    pub max_uses: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "elchbot".to_string(),
            id: String::new(),
            owner_id: String::new(),
            prefix: "%".to_string(),
        }
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./modules"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("databases/elchcoins.db"),
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            amount: 10,
            interval_secs: 600,
            follow_bonus: 100,
            retry_secs: 60,
        }
    }
}

impl RewardsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            shutdown_grace_secs: 5,
        }
    }
}

impl ConsoleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 0,
            permission: Role::Everyone,
            channels: Vec::new(),
            max_uses: 0,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    /// Load the config file when present, then apply environment overrides
    pub fn load_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override fields from environment variables. Each variable is looked up
    /// by its lowercase name first, then uppercase.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .or_else(|| lookup(&name.to_uppercase()))
                .filter(|v| !v.trim().is_empty())
        };

        if let Some(v) = get("client_id") {
            self.credentials.client_id = v;
        }
        if let Some(v) = get("client_secret") {
            self.credentials.client_secret = v;
        }
        if let Some(v) = get("access_token") {
            self.credentials.access_token = v;
        }
        if let Some(v) = get("bot_id") {
            self.bot.id = v;
        }
        if let Some(v) = get("bot_name") {
            self.bot.name = v;
        }
        if let Some(v) = get("owner_id") {
            self.bot.owner_id = v;
        }
        if let Some(v) = get("channel") {
            self.channels = v
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("prefix") {
            self.bot.prefix = v;
        }
    }

    /// Presence check for everything the worker needs to connect
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        let required = [
            ("client_id", &self.credentials.client_id),
            ("client_secret", &self.credentials.client_secret),
            ("access_token", &self.credentials.access_token),
            ("bot_id", &self.bot.id),
            ("owner_id", &self.bot.owner_id),
            ("prefix", &self.bot.prefix),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                missing.push(name.to_string());
            }
        }
        if self.channel_list().is_empty() {
            missing.push("channel".to_string());
        }

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        // the parser splits on whitespace before stripping the prefix
        if self.bot.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(format!(
                "prefix {:?} must not contain whitespace",
                self.bot.prefix
            )));
        }
        Ok(())
    }

    /// Normalized, de-duplicated channel names
    pub fn channel_list(&self) -> Vec<String> {
        let mut channels: Vec<String> = Vec::new();
        for channel in self.channels.iter().map(|c| normalize_channel(c)) {
            if !channel.is_empty() && !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        channels
    }

    /// Default file printed by `init-config`
    pub fn example() -> Self {
        let mut config = Self::default();
        config.channels = vec!["your_channel".to_string()];
        config.commands.insert(
            "dice".to_string(),
            CommandPolicy {
                cooldown_secs: 5,
                ..CommandPolicy::default()
            },
        );
        config.commands.insert(
            "autoreward".to_string(),
            CommandPolicy {
                permission: Role::Moderator,
                ..CommandPolicy::default()
            },
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("client_id", "cid"),
            ("client_secret", "secret"),
            ("ACCESS_TOKEN", "token"),
            ("bot_id", "123"),
            ("owner_id", "456"),
            ("channel", "#Foo, bar,,"),
            ("prefix", "!"),
        ])
    }

    #[test]
    fn default_config_is_missing_everything_required() {
        let err = Config::default().validate().unwrap_err();
        match err {
            ConfigError::Missing(fields) => {
                assert_eq!(
                    fields,
                    vec!["client_id", "client_secret", "access_token", "bot_id", "owner_id", "channel"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_overrides_fill_required_fields() {
        let env = full_env();
        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        config.validate().unwrap();
        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.credentials.access_token, "token");
        assert_eq!(config.channel_list(), vec!["foo", "bar"]);
    }

    #[test]
    fn prefix_with_whitespace_is_invalid() {
        let env = full_env();
        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));
        config.bot.prefix = "! ".into();

        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn empty_prefix_is_reported_missing() {
        let env = full_env();
        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));
        config.bot.prefix = String::new();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("prefix"));
    }

    #[test]
    fn yaml_round_trip_uses_kebab_case() {
        let yaml = r#"
bot:
  name: elchbot
  id: "1"
  owner-id: "2"
  prefix: "%"
channels: [elch]
rewards:
  interval-secs: 30
commands:
  dice:
    cooldown-secs: 5
    permission: moderator
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bot.owner_id, "2");
        assert_eq!(config.rewards.interval_secs, 30);
        assert_eq!(config.rewards.amount, 10);
        let dice = &config.commands["dice"];
        assert_eq!(dice.cooldown_secs, 5);
        assert_eq!(dice.permission, Role::Moderator);
        assert!(dice.enabled);
    }

    #[test]
    fn load_with_env_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with_env(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.modules.directory, PathBuf::from("./modules"));
    }
}
