//! Rede Node Store
//!
//! Durable, flat storage for leader records. The store knows nothing about
//! tree invariants; it offers point reads, single-level child listings, a
//! paged transitive-closure query and versioned atomic writes. Everything
//! structural is decided by the callers in `rede-engine`.
//!
//! # Paging
//!
//! The backing query engine caps any single result set (1000 rows by
//! default). [`NodeStore::list_descendants_paged`] serves the closure of a
//! root one page at a time; a page shorter than the requested size is the
//! last one. Continuation tokens are tied to the store generation they were
//! issued at: after any write, a follow-up page fails with
//! [`StoreError::StaleToken`] and the caller starts over from the first page.
//!
//! # Versioned Writes
//!
//! Every row carries a version that the store bumps on each write. A
//! [`Batch`] lists the versions its author read; [`NodeStore::apply`] checks
//! all of them and then writes everything, or writes nothing and returns
//! [`StoreError::VersionConflict`].
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process map, used by tests and the admin CLI.
//! - `RocksStore` (feature `rocksdb`): RocksDB keyspace of JSON rows.

mod batch;
mod error;
mod memory;
mod page;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use batch::{Batch, LeaderPatch, Write};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use page::{Page, PageToken};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use rede_hierarchy::{LeaderId, LeaderNode};

/// Storage backend for leader records.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch one leader.
    async fn get(&self, id: &LeaderId) -> Result<LeaderNode>;

    /// Direct children of `parent`, active or not.
    async fn list_children(&self, parent: &LeaderId) -> Result<Vec<LeaderNode>>;

    /// One page of the active rows reachable from `root`, root included,
    /// breadth-first. Every page is cut from the same snapshot as the first
    /// one, or the call fails with [`StoreError::StaleToken`].
    async fn list_descendants_paged(
        &self,
        root: &LeaderId,
        page_size: usize,
        token: Option<PageToken>,
    ) -> Result<Page>;

    /// Commit every write in `batch` or none of them.
    async fn apply(&self, batch: &Batch) -> Result<()>;

    /// Create a raw record (the onboarding path).
    async fn insert(&self, node: LeaderNode) -> Result<()>;

    /// Active coordinators.
    async fn list_coordinators(&self) -> Result<Vec<LeaderNode>>;

    /// Active, non-coordinator leaders without a parent.
    async fn list_unattached(&self) -> Result<Vec<LeaderNode>>;

    /// Largest page the backend will serve.
    fn max_page_size(&self) -> usize;

    /// Page size a request for `requested` rows is actually served at.
    fn effective_page_size(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_page_size().max(1))
    }

    /// Patch a single row that must still be at `expected_version`.
    async fn update(
        &self,
        id: &LeaderId,
        patch: LeaderPatch,
        expected_version: u64,
    ) -> Result<LeaderNode> {
        let mut current = self.get(id).await?;
        current.version = expected_version;
        let mut batch = Batch::new();
        batch.update(&current, patch);
        self.apply(&batch).await?;
        self.get(id).await
    }
}
