//! SQLite-backed points ledger

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::application::errors::StorageError;
use crate::domain::traits::Ledger;

/// Points ledger stored in a single `user_points` table.
///
/// All access goes through one connection behind a mutex, so updates to the
/// same user are applied one after another.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        init_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StorageError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::TaskJoin(e.to_string()))?
    }
}

fn init_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_points (
            username TEXT PRIMARY KEY,
            points INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    Ok(())
}

fn sql_amount(amount: u64) -> Result<i64, StorageError> {
    i64::try_from(amount).map_err(|_| StorageError::InvalidAmount(amount))
}

fn balance(conn: &Connection, user: &str) -> Result<u64, StorageError> {
    let points: Option<i64> = conn
        .query_row(
            "SELECT points FROM user_points WHERE username = ?1",
            [user],
            |row| row.get(0),
        )
        .optional()?;
    Ok(points.map(|p| u64::try_from(p).unwrap_or(0)).unwrap_or(0))
}

fn credit(conn: &Connection, user: &str, amount: i64) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO user_points (username, points) VALUES (?1, ?2)
         ON CONFLICT(username) DO UPDATE SET points = points + ?2",
        params![user, amount],
    )?;
    Ok(())
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn get(&self, user: &str) -> Result<u64, StorageError> {
        let user = user.to_lowercase();
        self.with_conn(move |conn| balance(conn, &user)).await
    }

    async fn add(&self, user: &str, amount: u64) -> Result<u64, StorageError> {
        let user = user.to_lowercase();
        let amount = sql_amount(amount)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            credit(&tx, &user, amount)?;
            let points = balance(&tx, &user)?;
            tx.commit()?;
            Ok(points)
        })
        .await
    }

    async fn subtract(&self, user: &str, amount: u64) -> Result<u64, StorageError> {
        let user = user.to_lowercase();
        let amount = sql_amount(amount)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE user_points SET points = MAX(points - ?1, 0) WHERE username = ?2",
                params![amount, user],
            )?;
            let points = balance(&tx, &user)?;
            tx.commit()?;
            Ok(points)
        })
        .await
    }

    async fn reset(&self, user: &str) -> Result<(), StorageError> {
        let user = user.to_lowercase();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE user_points SET points = 0 WHERE username = ?1",
                [user],
            )?;
            Ok(())
        })
        .await
    }

    async fn top(&self, limit: usize) -> Result<Vec<(String, u64)>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT username, points FROM user_points
                 WHERE points > 0
                 ORDER BY points DESC, username ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], |row| {
                let points: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, u64::try_from(points).unwrap_or(0)))
            })?;

            let mut users = Vec::new();
            for row in rows {
                users.push(row?);
            }
            Ok(users)
        })
        .await
    }

    async fn add_many(&self, users: &[String], amount: u64) -> Result<usize, StorageError> {
        let users: Vec<String> = users.iter().map(|u| u.to_lowercase()).collect();
        let amount = sql_amount(amount)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for user in &users {
                credit(&tx, user, amount)?;
            }
            tx.commit()?;
            Ok(users.len())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_get_reports_balance() {
        let ledger = SqliteLedger::in_memory().unwrap();
        assert_eq!(ledger.get("alice").await.unwrap(), 0);
        assert_eq!(ledger.add("alice", 50).await.unwrap(), 50);
        assert_eq!(ledger.add("Alice", 25).await.unwrap(), 75);
        assert_eq!(ledger.get("ALICE").await.unwrap(), 75);
    }

    #[tokio::test]
    async fn subtract_clamps_at_zero() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.add("alice", 50).await.unwrap();
        assert_eq!(ledger.subtract("alice", 20).await.unwrap(), 30);
        assert_eq!(ledger.subtract("alice", 1000).await.unwrap(), 0);
        assert_eq!(ledger.subtract("nobody", 5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_sets_zero() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.add("bob", 10).await.unwrap();
        ledger.reset("bob").await.unwrap();
        assert_eq!(ledger.get("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn top_orders_by_balance() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.add("a", 10).await.unwrap();
        ledger.add("b", 30).await.unwrap();
        ledger.add("c", 20).await.unwrap();
        ledger.add("d", 5).await.unwrap();

        let top = ledger.top(3).await.unwrap();
        assert_eq!(
            top,
            vec![("b".to_string(), 30), ("c".to_string(), 20), ("a".to_string(), 10)]
        );
    }

    #[tokio::test]
    async fn add_many_credits_everyone() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.add("alice", 5).await.unwrap();
        let users = vec!["alice".to_string(), "Bob".to_string()];
        assert_eq!(ledger.add_many(&users, 10).await.unwrap(), 2);
        assert_eq!(ledger.get("alice").await.unwrap(), 15);
        assert_eq!(ledger.get("bob").await.unwrap(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_do_not_lose_updates() {
        let ledger = SqliteLedger::in_memory().unwrap();
        ledger.add("alice", 7).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..40u64 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    ledger.add("alice", i).await.map(|_| ())
                } else {
                    ledger.add_many(&["alice".to_string()], i).await.map(|_| ())
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let expected = 7 + (0..40u64).sum::<u64>();
        assert_eq!(ledger.get("alice").await.unwrap(), expected);
    }

    #[tokio::test]
    async fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("databases").join("elchcoins.db");
        let ledger = SqliteLedger::open(&path).unwrap();
        ledger.add("carol", 3).await.unwrap();
        assert!(path.exists());

        let reopened = SqliteLedger::open(&path).unwrap();
        assert_eq!(reopened.get("carol").await.unwrap(), 3);
    }
}
