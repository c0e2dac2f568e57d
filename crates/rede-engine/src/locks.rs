//! Per-tree mutation locks.
//!
//! Structural mutations on the same tree run one at a time. A mutation that
//! touches two trees (a branch moving from one coordinator to another) holds
//! both locks, always taken in id order so two such moves cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use rede_hierarchy::LeaderId;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Lock table keyed by tree root.
#[derive(Debug, Default)]
pub struct TreeLocks {
    table: StdMutex<HashMap<LeaderId, Arc<Mutex<()>>>>,
}

/// Held locks; released on drop.
#[derive(Debug)]
pub struct TreeGuard {
    roots: Vec<LeaderId>,
    _held: Vec<OwnedMutexGuard<()>>,
}

impl TreeGuard {
    /// Roots this guard covers, sorted.
    pub fn roots(&self) -> &[LeaderId] {
        &self.roots
    }

    pub fn covers(&self, root: &LeaderId) -> bool {
        self.roots.binary_search(root).is_ok()
    }
}

impl TreeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every tree in `roots`.
    pub async fn acquire<I>(&self, roots: I) -> TreeGuard
    where
        I: IntoIterator<Item = LeaderId>,
    {
        let mut roots: Vec<LeaderId> = roots.into_iter().collect();
        roots.sort();
        roots.dedup();

        let mutexes: Vec<Arc<Mutex<()>>> = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on.
            table.retain(|_, m| Arc::strong_count(m) > 1);
            roots
                .iter()
                .map(|root| Arc::clone(table.entry(root.clone()).or_default()))
                .collect()
        };

        let mut held = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            held.push(mutex.lock_owned().await);
        }
        trace!("Locked trees {:?}", roots);

        TreeGuard {
            roots,
            _held: held,
        }
    }

    /// Number of trees with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_tree_is_exclusive() {
        let locks = Arc::new(TreeLocks::new());
        let guard = locks.acquire([LeaderId::from("r")]).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire([LeaderId::from("r")]).await.roots().len() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        assert_eq!(contender.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn different_trees_do_not_block() {
        let locks = TreeLocks::new();
        let _a = locks.acquire([LeaderId::from("a")]).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire([LeaderId::from("b")]),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn roots_are_sorted_and_deduplicated() {
        let locks = TreeLocks::new();
        let guard = locks
            .acquire([LeaderId::from("z"), LeaderId::from("a"), LeaderId::from("z")])
            .await;
        assert_eq!(guard.roots(), &[LeaderId::from("a"), LeaderId::from("z")]);
        assert!(guard.covers(&LeaderId::from("z")));
        assert!(!guard.covers(&LeaderId::from("m")));
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = TreeLocks::new();
        drop(locks.acquire([LeaderId::from("a")]).await);
        let _b = locks.acquire([LeaderId::from("b")]).await;
        assert_eq!(locks.tracked(), 1);
    }
}
