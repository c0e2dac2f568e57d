//! Persistent node store using RocksDB.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rede_hierarchy::{LeaderId, LeaderNode, DEFAULT_PAGE_CAP};
use rocksdb::{Options, WriteBatch, DB};
use tokio::sync::Mutex;
use tracing::trace;

use crate::batch::Batch;
use crate::error::{Result, StoreError};
use crate::page::{closure, slice_page, Page, PageToken};
use crate::NodeStore;

const LEADER_PREFIX: &[u8] = b"leader:";

/// Node store backed by RocksDB, one JSON value per leader.
pub struct RocksStore {
    db: DB,
    page_cap: usize,
    // Serializes read-check-write of batches, and closure scans against them.
    writer: Mutex<()>,
    // Writes since open; page tokens do not outlive the process.
    generation: AtomicU64,
}

impl RocksStore {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            page_cap: DEFAULT_PAGE_CAP,
            writer: Mutex::new(()),
            generation: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = page_cap.max(1);
        self
    }

    fn key(id: &LeaderId) -> Vec<u8> {
        format!("leader:{}", id).into_bytes()
    }

    fn read(&self, id: &LeaderId) -> Result<Option<LeaderNode>> {
        match self.db.get(Self::key(id))? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn put(&self, node: &LeaderNode) -> Result<()> {
        let value = serde_json::to_vec(node)?;
        self.db.put(Self::key(&node.id), value)?;
        Ok(())
    }

    /// All leader rows, in key order.
    fn scan(&self) -> Result<Vec<LeaderNode>> {
        let mut rows = Vec::new();
        for item in self.db.prefix_iterator(LEADER_PREFIX) {
            let (key, value) = item?;
            if !key.starts_with(LEADER_PREFIX) {
                break;
            }
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl NodeStore for RocksStore {
    async fn get(&self, id: &LeaderId) -> Result<LeaderNode> {
        self.read(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list_children(&self, parent: &LeaderId) -> Result<Vec<LeaderNode>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|n| n.parent_id.as_ref() == Some(parent))
            .collect())
    }

    async fn list_descendants_paged(
        &self,
        root: &LeaderId,
        page_size: usize,
        token: Option<PageToken>,
    ) -> Result<Page> {
        let page_size = self.effective_page_size(page_size);
        let (rows, generation) = {
            let _writer = self.writer.lock().await;
            (self.scan()?, self.generation.load(Ordering::SeqCst))
        };
        let page = slice_page(closure(&rows, root), page_size, token.as_ref(), generation)?;
        trace!("Served {} rows below {}", page.len(), root);
        Ok(page)
    }

    async fn apply(&self, batch: &Batch) -> Result<()> {
        let _writer = self.writer.lock().await;

        let mut current = Vec::with_capacity(batch.len());
        for write in batch.writes() {
            if let Some(row) = self.read(write.id())? {
                current.push(row);
            }
        }
        let staged = batch.resolve(|id| current.iter().find(|n| &n.id == id).cloned())?;

        let mut wb = WriteBatch::default();
        for node in &staged {
            wb.put(Self::key(&node.id), serde_json::to_vec(node)?);
        }
        self.db.write(wb)?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, node: LeaderNode) -> Result<()> {
        let _writer = self.writer.lock().await;
        if self.read(&node.id)?.is_some() {
            return Err(StoreError::Duplicate(node.id));
        }
        self.put(&node)?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_coordinators(&self) -> Result<Vec<LeaderNode>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|n| n.is_active && n.is_coordinator)
            .collect())
    }

    async fn list_unattached(&self) -> Result<Vec<LeaderNode>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|n| n.is_active && !n.is_coordinator && n.parent_id.is_none())
            .collect())
    }

    fn max_page_size(&self) -> usize {
        self.page_cap
    }
}
