//! Fixtures shared by the integration tests.

use std::sync::Arc;

use rede_engine::{EngineConfig, HierarchyService, RetryPolicy};
use rede_hierarchy::{LeaderId, LeaderNode};
use rede_store::{MemoryStore, NodeStore};

/// Builds leader rows with levels derived from their parents.
#[derive(Debug, Default)]
pub struct Network {
    rows: Vec<LeaderNode>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coordinator(mut self, id: &str) -> Self {
        self.rows.push(LeaderNode::coordinator(id, id.to_uppercase()));
        self
    }

    /// Add `id` under `parent`, which must already be in the network.
    pub fn leader(mut self, id: &str, parent: &str) -> Self {
        let node = match self.find(parent) {
            Some(p) => LeaderNode::new(id, id.to_uppercase()).under(p),
            None => panic!("parent {parent} not added yet"),
        };
        self.rows.push(node);
        self
    }

    /// Add an unattached leader.
    pub fn loose(mut self, id: &str) -> Self {
        self.rows.push(LeaderNode::new(id, id.to_uppercase()));
        self
    }

    /// Coordinator `prefix0` with a single chain down to `prefix{len-1}`.
    pub fn chain(mut self, prefix: &str, len: usize) -> Self {
        self = self.coordinator(&format!("{prefix}0"));
        for i in 1..len {
            self = self.leader(&format!("{prefix}{i}"), &format!("{prefix}{}", i - 1));
        }
        self
    }

    /// Set the referral count of an existing leader.
    pub fn cadastros(mut self, id: &str, count: u64) -> Self {
        if let Some(node) = self.rows.iter_mut().find(|n| n.id.as_str() == id) {
            node.cadastros = count;
        }
        self
    }

    pub fn rows(&self) -> &[LeaderNode] {
        &self.rows
    }

    fn find(&self, id: &str) -> Option<&LeaderNode> {
        self.rows.iter().find(|n| n.id.as_str() == id)
    }

    /// Load into a fresh in-memory store capped at `page_cap` rows per page.
    pub async fn store(&self, page_cap: usize) -> Arc<MemoryStore> {
        let store = MemoryStore::with_page_cap(page_cap);
        seed(&store, &self.rows).await;
        Arc::new(store)
    }
}

pub async fn seed<S: NodeStore + ?Sized>(store: &S, rows: &[LeaderNode]) {
    for row in rows {
        if let Err(e) = store.insert(row.clone()).await {
            panic!("seeding {} failed: {e}", row.id);
        }
    }
}

/// Engine config for tests: quick retries, no environment.
pub fn test_config() -> EngineConfig {
    EngineConfig::new().with_retry(RetryPolicy::fast())
}

pub fn service<S: NodeStore + ?Sized>(store: Arc<S>) -> HierarchyService<S> {
    HierarchyService::new(store, test_config())
}

pub fn id(s: &str) -> LeaderId {
    LeaderId::from(s)
}
