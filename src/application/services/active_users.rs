//! Set of chatters seen since the last reward cycle

use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ActiveUsers {
    users: Mutex<BTreeSet<String>>,
}

impl ActiveUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `user`, keyed by lowercased name
    pub fn register(&self, user: &str) {
        let key = user.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        self.with_users(|users| {
            users.insert(key);
        });
    }

    pub fn contains(&self, user: &str) -> bool {
        self.with_users(|users| users.contains(&user.to_lowercase()))
    }

    pub fn len(&self) -> usize {
        self.with_users(|users| users.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of the current set
    pub fn snapshot(&self) -> Vec<String> {
        self.with_users(|users| users.iter().cloned().collect())
    }

    pub fn clear(&self) {
        self.with_users(|users| users.clear());
    }

    /// Remove the given users, keeping anyone registered since
    pub fn remove_all(&self, users: &[String]) {
        self.with_users(|set| {
            for user in users {
                set.remove(&user.to_lowercase());
            }
        });
    }

    fn with_users<T>(&self, f: impl FnOnce(&mut BTreeSet<String>) -> T) -> T {
        let mut guard = match self.users.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}
