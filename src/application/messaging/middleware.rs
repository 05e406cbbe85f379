//! Middleware system for the command dispatch pipeline
//!
//! Every middleware sees an invocation before its handler runs and may deny
//! it. Denied invocations are logged and never reach the handler.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::domain::entities::{normalize_channel, Invocation, Role};
use crate::infrastructure::config::CommandPolicy;
use crate::infrastructure::plugins::CommandEntry;

/// Pre-invoke check
pub trait Middleware: Send + Sync {
    fn process(&self, invocation: &Invocation, command: &CommandEntry) -> MiddlewareResult;
}

pub type MiddlewareResult = Result<(), MiddlewareError>;

/// Why an invocation was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareError {
    /// Command switched off or not allowed in this channel
    Blocked(String),
    RateLimited { retry_after: Duration },
    PermissionDenied { required: Role, actual: Role },
    UsageExhausted { limit: u32 },
    Internal(String),
}

impl std::fmt::Display for MiddlewareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiddlewareError::Blocked(msg) => write!(f, "Blocked: {}", msg),
            MiddlewareError::RateLimited { retry_after } => {
                write!(f, "On cooldown, retry after {}s", retry_after.as_secs().max(1))
            }
            MiddlewareError::PermissionDenied { required, actual } => {
                write!(f, "Permission denied: requires {}, caller is {}", required, actual)
            }
            MiddlewareError::UsageExhausted { limit } => write!(f, "Used up all {} uses", limit),
            MiddlewareError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for MiddlewareError {}

/// Ordered list of middleware, run first to last
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// The chain for a `commands:` config section
    pub fn from_policies(policies: &BTreeMap<String, CommandPolicy>) -> Self {
        let cooldowns = policies
            .iter()
            .filter(|(_, p)| p.cooldown_secs > 0)
            .map(|(name, p)| (name.clone(), Duration::from_secs(p.cooldown_secs)))
            .collect();
        Self::policy_chain(policies, cooldowns)
    }

    // Usage counting goes last: only invocations every other check allowed
    // use up one of the allowed uses.
    fn policy_chain(policies: &BTreeMap<String, CommandPolicy>, cooldowns: HashMap<String, Duration>) -> Self {
        Self::new()
            .add(LoggingMiddleware)
            .add(PolicyMiddleware::new(policies.clone()))
            .add(CooldownMiddleware::new(cooldowns))
            .add(UsageLimitMiddleware::new(
                policies
                    .iter()
                    .filter(|(_, p)| p.max_uses > 0)
                    .map(|(name, p)| (name.clone(), p.max_uses))
                    .collect(),
            ))
    }

    /// First denial wins
    pub fn run(&self, invocation: &Invocation, command: &CommandEntry) -> MiddlewareResult {
        for middleware in &self.middlewares {
            middleware.process(invocation, command)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Per-command `enabled`, `channels` and `permission`
pub struct PolicyMiddleware {
    policies: BTreeMap<String, CommandPolicy>,
}

impl PolicyMiddleware {
    pub fn new(policies: BTreeMap<String, CommandPolicy>) -> Self {
        Self { policies }
    }
}

impl Middleware for PolicyMiddleware {
    fn process(&self, invocation: &Invocation, command: &CommandEntry) -> MiddlewareResult {
        let Some(policy) = self.policies.get(&command.name) else {
            return Ok(());
        };

        if !policy.enabled {
            return Err(MiddlewareError::Blocked(format!("{} is disabled", command.name)));
        }

        if !policy.channels.is_empty()
            && !policy
                .channels
                .iter()
                .any(|c| normalize_channel(c) == invocation.channel)
        {
            return Err(MiddlewareError::Blocked(format!(
                "{} is not enabled in #{}",
                command.name, invocation.channel
            )));
        }

        if invocation.author.role < policy.permission {
            return Err(MiddlewareError::PermissionDenied {
                required: policy.permission,
                actual: invocation.author.role,
            });
        }

        Ok(())
    }
}

/// Per-user `max-uses` of a command
pub struct UsageLimitMiddleware {
    limits: HashMap<String, u32>,
    uses: Mutex<HashMap<(String, String), u32>>,
}

impl UsageLimitMiddleware {
    pub fn new(limits: HashMap<String, u32>) -> Self {
        Self {
            limits,
            uses: Mutex::new(HashMap::new()),
        }
    }
}

impl Middleware for UsageLimitMiddleware {
    fn process(&self, invocation: &Invocation, command: &CommandEntry) -> MiddlewareResult {
        let Some(&limit) = self.limits.get(&command.name) else {
            return Ok(());
        };
        let mut uses = lock(&self.uses);
        let count = uses
            .entry((command.name.clone(), invocation.author.ledger_key()))
            .or_insert(0);
        if *count >= limit {
            return Err(MiddlewareError::UsageExhausted { limit });
        }
        *count += 1;
        Ok(())
    }
}

/// Per-user, per-command cooldown
pub struct CooldownMiddleware {
    cooldowns: HashMap<String, Duration>,
    last_use: Mutex<HashMap<(String, String), Instant>>,
}

impl CooldownMiddleware {
    pub fn new(cooldowns: HashMap<String, Duration>) -> Self {
        Self {
            cooldowns,
            last_use: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, command: &str, user: String, window: Duration) -> MiddlewareResult {
        let mut last_use = lock(&self.last_use);
        let now = Instant::now();
        let key = (command.to_string(), user);

        if let Some(previous) = last_use.get(&key) {
            let elapsed = now.duration_since(*previous);
            if elapsed < window {
                return Err(MiddlewareError::RateLimited {
                    retry_after: window - elapsed,
                });
            }
        }

        // Drop entries that can no longer block anyone
        last_use.retain(|(name, _), at| {
            self.cooldowns
                .get(name)
                .is_some_and(|w| now.duration_since(*at) < *w)
        });
        last_use.insert(key, now);
        Ok(())
    }
}

impl Middleware for CooldownMiddleware {
    fn process(&self, invocation: &Invocation, command: &CommandEntry) -> MiddlewareResult {
        match self.cooldowns.get(&command.name) {
            Some(window) if invocation.author.role < Role::Moderator => {
                self.check(&command.name, invocation.author.ledger_key(), *window)
            }
            _ => Ok(()),
        }
    }
}

/// Traces every invocation that reaches the chain
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn process(&self, invocation: &Invocation, command: &CommandEntry) -> MiddlewareResult {
        let preview: String = invocation.args.chars().take(50).collect();
        tracing::debug!(
            "[#{}] {} -> {} ({}) {}",
            invocation.channel,
            invocation.author.name,
            invocation.command,
            command.module,
            preview
        );
        Ok(())
    }
}
