use async_trait::async_trait;
use crate::application::errors::StorageError;

/// Ledger trait - per-user point balances keyed by lowercased username
///
/// Balances never go below zero. Implementations must serialize
/// read-modify-write updates of the same user so concurrent adds never
/// lose an update.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Current balance, zero for unknown users
    async fn get(&self, user: &str) -> Result<u64, StorageError>;

    /// Credit `amount`, creating the user when missing. Returns the new balance.
    async fn add(&self, user: &str, amount: u64) -> Result<u64, StorageError>;

    /// Debit `amount`, clamped at zero. Returns the new balance.
    async fn subtract(&self, user: &str, amount: u64) -> Result<u64, StorageError>;

    /// Set the balance to zero
    async fn reset(&self, user: &str) -> Result<(), StorageError>;

    /// Highest balances first
    async fn top(&self, limit: usize) -> Result<Vec<(String, u64)>, StorageError>;

    /// Credit every user in one all-or-nothing update. Returns how many were credited.
    async fn add_many(&self, users: &[String], amount: u64) -> Result<usize, StorageError>;
}
