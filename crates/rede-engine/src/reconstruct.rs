//! Tree Reconstructor.
//!
//! Drains the store's paged closure query for a root and hands the flat rows
//! to [`rede_hierarchy::build_tree`]. Nothing is cached between calls: every
//! request is a full re-fetch.
//!
//! Paging continues while pages come back full and stops at the first short
//! page. A page that fails transiently is retried with the same token, so the
//! fetch resumes where it stopped; once retries are exhausted the whole call
//! fails and no partial tree is returned.
//!
//! A write landing between two pages invalidates the token. The fetch then
//! starts over from the first page, at most `retry.max_attempts` times in
//! total, and fails with `ConcurrentModification` if the store never holds
//! still long enough.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rede_guard::Rejection;
use rede_hierarchy::{build_tree, BuildOutcome, LeaderId, LeaderNode, TreeNode};
use rede_store::{NodeStore, Page, PageToken, StoreError};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Run one store call under `limit`.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Timeout(limit)),
    }
}

/// Rebuilds in-memory trees from the node store.
pub struct TreeReconstructor<S: ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: ?Sized> Clone for TreeReconstructor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: NodeStore + ?Sized> TreeReconstructor<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch one leader.
    pub async fn leader(&self, id: &LeaderId) -> Result<LeaderNode> {
        bounded(self.config.op_timeout, self.store.get(id)).await
    }

    /// Complete tree of a coordinator.
    ///
    /// Fails with `NotACoordinator` if `coordinator` is not a root; returns
    /// `None` if the coordinator dropped out of the closure (e.g. it was
    /// deactivated meanwhile).
    pub async fn leader_tree(&self, coordinator: &LeaderId) -> Result<Option<TreeNode>> {
        let root = self.leader(coordinator).await?;
        if !root.is_coordinator {
            return Err(Rejection::NotACoordinator(coordinator.clone()).into());
        }
        Ok(self.branch(coordinator).await?.tree)
    }

    /// Subtree rooted at any leader, with orphan diagnostics.
    pub async fn branch(&self, root: &LeaderId) -> Result<BuildOutcome> {
        let rows = self.descendants(root).await?;
        let fetched = rows.len();
        let outcome = build_tree(root, rows);

        if !outcome.orphans.is_empty() {
            warn!(
                "Excluded {} rows below {}: parents missing for {:?}",
                outcome.excluded, root, outcome.orphans
            );
        } else if outcome.excluded > 0 {
            warn!("Excluded {} unreachable rows below {}", outcome.excluded, root);
        }
        debug!("Reconstructed {} of {} rows below {}", fetched - outcome.excluded, fetched, root);

        Ok(outcome)
    }

    /// Every active row reachable from `root`, root included, all from one
    /// store generation.
    pub async fn descendants(&self, root: &LeaderId) -> Result<Vec<LeaderNode>> {
        let page_size = self.store.effective_page_size(self.config.page_size);
        let passes = self.config.retry.max_attempts.max(1);

        for pass in 1..=passes {
            match self.drain(root, page_size).await {
                Ok(rows) => return Ok(rows),
                Err(Error::Store(StoreError::StaleToken { issued, current })) => {
                    debug!(
                        "Closure of {} changed mid-read (generation {} -> {}), pass {}/{}",
                        root, issued, current, pass, passes
                    );
                }
                Err(e) => return Err(e),
            }
        }

        warn!("Gave up reading {} after {} passes: store kept changing", root, passes);
        Err(Error::ConcurrentModification { id: root.clone() })
    }

    /// One pass over every page of the closure.
    async fn drain(&self, root: &LeaderId, page_size: usize) -> Result<Vec<LeaderNode>> {
        let mut rows = Vec::new();
        let mut token: Option<PageToken> = None;
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(root, page_size, token.take()).await?;
            pages += 1;
            let served = page.len();
            rows.extend(page.nodes);

            if served < page_size {
                break;
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!("Fetched {} rows below {} in {} pages", rows.len(), root, pages);
        Ok(rows)
    }

    /// `id` followed by its ancestors up to the top of its chain.
    ///
    /// Bounded like [`rede_guard::ancestor_chain`], so a corrupted parent loop
    /// is rejected rather than followed.
    pub async fn ancestry(&self, id: &LeaderId) -> Result<Vec<LeaderNode>> {
        let limit = self.config.max_depth as usize + 1;
        let mut chain = vec![self.leader(id).await?];

        while let Some(parent) = chain.last().and_then(|n| n.parent_id.clone()) {
            if chain.len() >= limit {
                return Err(Rejection::MaxDepthExceeded {
                    depth: chain.len() as u32,
                    max: self.config.max_depth,
                }
                .into());
            }
            chain.push(self.leader(&parent).await?);
        }

        Ok(chain)
    }

    /// Topmost ancestor of `id` (the coordinator, for attached leaders).
    pub async fn tree_root(&self, id: &LeaderId) -> Result<LeaderId> {
        let chain = self.ancestry(id).await?;
        Ok(chain
            .last()
            .map(|n| n.id.clone())
            .unwrap_or_else(|| id.clone()))
    }

    async fn fetch_page(
        &self,
        root: &LeaderId,
        page_size: usize,
        token: Option<PageToken>,
    ) -> Result<Page> {
        let retry = self.config.retry;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let call = self
                .store
                .list_descendants_paged(root, page_size, token.clone());
            match bounded(self.config.op_timeout, call).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        "Page fetch below {} failed (attempt {}/{}): {}; retrying in {:?}",
                        root, attempt, retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::mutation::MutationEngine;
    use async_trait::async_trait;
    use rede_guard::check_levels;
    use rede_store::{Batch, MemoryStore};
    use tokio::sync::Mutex;

    async fn store_with_chain(cap: usize, len: usize) -> Arc<MemoryStore> {
        let store = MemoryStore::with_page_cap(cap);
        let mut prev = LeaderNode::coordinator("n0", "N0");
        store.insert(prev.clone()).await.unwrap();
        for i in 1..len {
            let node = LeaderNode::new(format!("n{i}"), format!("N{i}")).under(&prev);
            store.insert(node.clone()).await.unwrap();
            prev = node;
        }
        Arc::new(store)
    }

    fn config() -> EngineConfig {
        EngineConfig::new().with_retry(RetryPolicy::fast())
    }

    #[tokio::test]
    async fn pages_until_short_page() {
        let store = store_with_chain(2, 5).await;
        let rec = TreeReconstructor::new(Arc::clone(&store), config());

        let tree = rec.leader_tree(&"n0".into()).await.unwrap().unwrap();
        assert_eq!(tree.len(), 5);
        // 2 + 2 + 1
        assert_eq!(store.page_fetches(), 3);
    }

    #[tokio::test]
    async fn exactly_full_last_page_needs_one_more_fetch() {
        let store = store_with_chain(2, 4).await;
        let rec = TreeReconstructor::new(Arc::clone(&store), config());

        let rows = rec.descendants(&"n0".into()).await.unwrap();
        assert_eq!(rows.len(), 4);
        // 2 + 2 + 0
        assert_eq!(store.page_fetches(), 3);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = store_with_chain(2, 5).await;
        store.fail_next_reads(2);
        let rec = TreeReconstructor::new(Arc::clone(&store), config());

        let tree = rec.leader_tree(&"n0".into()).await.unwrap().unwrap();
        assert_eq!(tree.len(), 5);
    }

    #[tokio::test]
    async fn exhausted_retries_return_error_not_partial_tree() {
        let store = store_with_chain(2, 5).await;
        store.fail_next_reads(10);
        let rec = TreeReconstructor::new(
            Arc::clone(&store),
            EngineConfig::new().with_retry(RetryPolicy::none()),
        );

        let err = rec.leader_tree(&"n0".into()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_pages_time_out() {
        let store = MemoryStore::new().with_latency(Duration::from_millis(200));
        store.insert(LeaderNode::coordinator("r", "Root")).await.unwrap();
        let rec = TreeReconstructor::new(
            Arc::new(store),
            EngineConfig::new()
                .with_op_timeout(Duration::from_millis(10))
                .with_retry(RetryPolicy::none()),
        );

        let err = rec.descendants(&"r".into()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    /// Runs the next queued branch move right after serving a first page.
    struct Interleaving {
        inner: Arc<MemoryStore>,
        writer: MutationEngine<MemoryStore>,
        moves: Mutex<Vec<(&'static str, &'static str)>>,
    }

    impl Interleaving {
        /// r -> {a, b}, a -> x, b -> y, served two rows per page.
        async fn new(moves: Vec<(&'static str, &'static str)>) -> Arc<Self> {
            let inner = MemoryStore::with_page_cap(2);
            let r = LeaderNode::coordinator("r", "R");
            let a = LeaderNode::new("a", "A").under(&r);
            let b = LeaderNode::new("b", "B").under(&r);
            let x = LeaderNode::new("x", "X").under(&a);
            let y = LeaderNode::new("y", "Y").under(&b);
            for node in [r, a, b, x, y] {
                inner.insert(node).await.unwrap();
            }
            let inner = Arc::new(inner);
            let mut moves = moves;
            moves.reverse();
            Arc::new(Self {
                writer: MutationEngine::new(Arc::clone(&inner), config()),
                inner,
                moves: Mutex::new(moves),
            })
        }
    }

    #[async_trait]
    impl NodeStore for Interleaving {
        async fn get(&self, id: &LeaderId) -> rede_store::Result<LeaderNode> {
            self.inner.get(id).await
        }

        async fn list_children(&self, parent: &LeaderId) -> rede_store::Result<Vec<LeaderNode>> {
            self.inner.list_children(parent).await
        }

        async fn list_descendants_paged(
            &self,
            root: &LeaderId,
            page_size: usize,
            token: Option<PageToken>,
        ) -> rede_store::Result<Page> {
            let first = token.is_none();
            let page = self.inner.list_descendants_paged(root, page_size, token).await?;
            if first {
                let next = self.moves.lock().await.pop();
                if let Some((branch, target)) = next {
                    self.writer
                        .move_branch(&branch.into(), &target.into())
                        .await
                        .unwrap();
                }
            }
            Ok(page)
        }

        async fn apply(&self, batch: &Batch) -> rede_store::Result<()> {
            self.inner.apply(batch).await
        }

        async fn insert(&self, node: LeaderNode) -> rede_store::Result<()> {
            self.inner.insert(node).await
        }

        async fn list_coordinators(&self) -> rede_store::Result<Vec<LeaderNode>> {
            self.inner.list_coordinators().await
        }

        async fn list_unattached(&self) -> rede_store::Result<Vec<LeaderNode>> {
            self.inner.list_unattached().await
        }

        fn max_page_size(&self) -> usize {
            self.inner.max_page_size()
        }
    }

    #[tokio::test]
    async fn write_between_pages_restarts_the_read() {
        let store = Interleaving::new(vec![("a", "b")]).await;
        let rec = TreeReconstructor::new(Arc::clone(&store), config());

        let tree = rec.leader_tree(&"r".into()).await.unwrap().unwrap();
        assert_eq!(tree.len(), 5);
        assert!(check_levels(&tree).is_empty());
        assert_eq!(
            tree.find(&"a".into()).unwrap().leader.parent_id,
            Some("b".into())
        );
        assert!(store.moves.lock().await.is_empty());
    }

    #[tokio::test]
    async fn endless_churn_is_a_concurrent_modification() {
        let store = Interleaving::new(vec![("a", "b"), ("a", "r"), ("a", "b")]).await;
        let rec = TreeReconstructor::new(
            Arc::clone(&store),
            EngineConfig::new().with_retry(RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::fast()
            }),
        );

        let err = rec.leader_tree(&"r".into()).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrentModification { ref id } if id.as_str() == "r"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn non_coordinator_is_rejected() {
        let store = store_with_chain(10, 3).await;
        let rec = TreeReconstructor::new(store, config());
        let err = rec.leader_tree(&"n1".into()).await.unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(Rejection::NotACoordinator(_))
        ));
    }

    #[tokio::test]
    async fn inactive_coordinator_yields_none() {
        let store = store_with_chain(10, 3).await;
        let mut root = store.get(&"n0".into()).await.unwrap();
        root.is_active = false;
        store.force_put(root).await;

        let rec = TreeReconstructor::new(store, config());
        assert!(rec.leader_tree(&"n0".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ancestry_walks_to_root() {
        let store = store_with_chain(10, 4).await;
        let rec = TreeReconstructor::new(store, config());

        let chain: Vec<_> = rec
            .ancestry(&"n3".into())
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id.0)
            .collect();
        assert_eq!(chain, vec!["n3", "n2", "n1", "n0"]);
        assert_eq!(rec.tree_root(&"n3".into()).await.unwrap().as_str(), "n0");
    }

    #[tokio::test]
    async fn ancestry_rejects_overlong_chain() {
        let store = store_with_chain(10, 6).await;
        let rec = TreeReconstructor::new(store, config().with_max_depth(3));
        let err = rec.ancestry(&"n5".into()).await.unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(Rejection::MaxDepthExceeded { max: 3, .. })
        ));
    }
}
