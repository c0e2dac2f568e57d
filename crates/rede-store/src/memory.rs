//! In-memory node store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rede_hierarchy::{LeaderId, LeaderNode, DEFAULT_PAGE_CAP};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::batch::Batch;
use crate::error::{Result, StoreError};
use crate::page::{closure, slice_page, Page, PageToken};
use crate::NodeStore;

/// Node store backed by an ordered map behind a `tokio` lock.
///
/// Besides serving tests and the admin CLI, it can simulate a flaky backend:
/// [`fail_next_reads`](Self::fail_next_reads) makes upcoming page fetches fail
/// with a transient error, and [`with_latency`](Self::with_latency) delays them.
///
/// Every write bumps a generation counter; page tokens from an older
/// generation are refused.
#[derive(Debug)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<LeaderId, LeaderNode>>,
    // Only changed while `rows` is write-locked.
    generation: AtomicU64,
    page_cap: usize,
    latency: Option<Duration>,
    failing_reads: AtomicUsize,
    page_fetches: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_cap(DEFAULT_PAGE_CAP)
    }

    /// Store whose closure query serves at most `page_cap` rows per call.
    pub fn with_page_cap(page_cap: usize) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            generation: AtomicU64::new(0),
            page_cap: page_cap.max(1),
            latency: None,
            failing_reads: AtomicUsize::new(0),
            page_fetches: AtomicUsize::new(0),
        }
    }

    /// Load a snapshot as-is (versions included). Later duplicates replace earlier rows.
    pub fn from_snapshot(rows: Vec<LeaderNode>) -> Self {
        let map = rows.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            rows: RwLock::new(map),
            ..Self::new()
        }
    }

    /// Every row, ordered by id.
    pub async fn snapshot(&self) -> Vec<LeaderNode> {
        self.rows.read().await.values().cloned().collect()
    }

    /// Delay each page fetch by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `count` page fetches fail with [`StoreError::Unavailable`].
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Number of page fetches served or failed so far.
    pub fn page_fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }

    /// Number of committed writes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Overwrite a row without version checks, as an out-of-band writer would.
    pub async fn force_put(&self, mut node: LeaderNode) {
        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.get(&node.id) {
            node.version = existing.version + 1;
        }
        rows.insert(node.id.clone(), node);
        self.bump_generation();
    }

    fn take_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn get(&self, id: &LeaderId) -> Result<LeaderNode> {
        self.rows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list_children(&self, parent: &LeaderId) -> Result<Vec<LeaderNode>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|n| n.parent_id.as_ref() == Some(parent))
            .cloned()
            .collect())
    }

    async fn list_descendants_paged(
        &self,
        root: &LeaderId,
        page_size: usize,
        token: Option<PageToken>,
    ) -> Result<Page> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.take_failure() {
            debug!("Simulated page fetch failure for root {}", root);
            return Err(StoreError::Unavailable("simulated outage".into()));
        }

        let page_size = self.effective_page_size(page_size);
        let (all, generation) = {
            let rows = self.rows.read().await;
            (closure(rows.values(), root), self.generation())
        };
        let page = slice_page(all, page_size, token.as_ref(), generation)?;
        trace!("Served {} rows below {}", page.len(), root);
        Ok(page)
    }

    async fn apply(&self, batch: &Batch) -> Result<()> {
        let mut rows = self.rows.write().await;
        let staged = batch.resolve(|id| rows.get(id).cloned())?;
        for node in staged {
            rows.insert(node.id.clone(), node);
        }
        self.bump_generation();
        Ok(())
    }

    async fn insert(&self, node: LeaderNode) -> Result<()> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&node.id) {
            return Err(StoreError::Duplicate(node.id));
        }
        rows.insert(node.id.clone(), node);
        self.bump_generation();
        Ok(())
    }

    async fn list_coordinators(&self) -> Result<Vec<LeaderNode>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|n| n.is_active && n.is_coordinator)
            .cloned()
            .collect())
    }

    async fn list_unattached(&self) -> Result<Vec<LeaderNode>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|n| n.is_active && !n.is_coordinator && n.parent_id.is_none())
            .cloned()
            .collect())
    }

    fn max_page_size(&self) -> usize {
        self.page_cap
    }
}
