//! Keyed serialization of appliance mutations.
//!
//! Publish and unpublish for the same access name must never interleave,
//! and host registration for the same uuid must not race itself. A lock
//! table keyed by name keeps that guarantee while letting unrelated
//! volumes proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct LockTable {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for a key, creating it on first use. The guard
    /// serializes all holders of the same key.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let table = Arc::new(LockTable::new());

        let guard = table.acquire("pvc-1").await;

        let contender = {
            let table = table.clone();
            tokio::spawn(async move {
                let _guard = table.acquire("pvc-1").await;
            })
        };

        // The second acquire must be blocked while the guard is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should finish once the guard is dropped")
            .expect("contender task should not panic");
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let table = LockTable::new();

        let _first = table.acquire("pvc-1").await;
        let second = tokio::time::timeout(Duration::from_millis(100), table.acquire("pvc-2")).await;
        assert!(second.is_ok());
    }
}
