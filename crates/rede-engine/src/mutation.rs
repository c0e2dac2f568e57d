//! Mutation Engine.
//!
//! Every structural change follows the same shape:
//!
//! 1. Resolve the trees the change touches and lock them (sorted, so two
//!    cross-tree moves cannot deadlock). If a tree root changed while we
//!    waited, give up with `ConcurrentModification`.
//! 2. Re-read the node, the target and its ancestry inside the lock.
//! 3. Ask the invariant guard.
//! 4. Commit one [`Batch`]: the updates plus a version check for every row
//!    the decision was based on. A writer that bypassed the locks still
//!    cannot slip a stale change through.

use std::sync::Arc;

use rede_guard::{
    can_deactivate, can_demote, can_move_branch, can_promote, can_remove, can_set_parent,
    resulting_level, Rejection,
};
use rede_hierarchy::{LeaderId, LeaderNode, TreeNode, ROOT_LEVEL};
use rede_store::{Batch, LeaderPatch, NodeStore};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::locks::{TreeGuard, TreeLocks};
use crate::reconstruct::{bounded, TreeReconstructor};

/// Outcome of promoting a leader together with its branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
    pub coordinator: LeaderNode,
    /// Descendants that now belong to the new tree.
    pub subordinates_moved: u64,
}

#[derive(Clone, Copy)]
enum Attach {
    SetParent,
    MoveBranch,
}

/// Applies validated structural changes to the node store.
pub struct MutationEngine<S: ?Sized> {
    reader: TreeReconstructor<S>,
    locks: Arc<TreeLocks>,
}

impl<S: ?Sized> Clone for MutationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S: NodeStore + ?Sized> MutationEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self::with_reader(TreeReconstructor::new(store, config))
    }

    pub fn with_reader(reader: TreeReconstructor<S>) -> Self {
        Self {
            reader,
            locks: Arc::new(TreeLocks::new()),
        }
    }

    fn config(&self) -> &EngineConfig {
        self.reader.config()
    }

    /// Turn a leader into the root of its own tree, keeping its branch.
    pub async fn promote(&self, id: &LeaderId) -> Result<LeaderNode> {
        Ok(self.promote_with_subordinates(id).await?.coordinator)
    }

    /// Like [`promote`](Self::promote), reporting how many leaders came along.
    pub async fn promote_with_subordinates(&self, id: &LeaderId) -> Result<PromotionReport> {
        let _guard = self.lock_trees(&[id]).await?;

        let chain = self.reader.ancestry(id).await?;
        let node = &chain[0];
        can_promote(node)?;

        let branch = self.reader.branch(id).await?;
        let mut batch = Batch::new();
        for ancestor in &chain[1..] {
            batch.check(ancestor);
        }
        let moved = stage_levels(&mut batch, branch.tree.as_ref(), |depth| {
            Some(ROOT_LEVEL + depth)
        });
        batch.update(
            node,
            LeaderPatch::new()
                .parent(None)
                .coordinator(true)
                .level(Some(ROOT_LEVEL)),
        );

        self.commit(&batch).await?;
        info!(
            "Promoted {} to coordinator ({} subordinates, was level {:?})",
            id, moved, node.hierarchy_level
        );

        Ok(PromotionReport {
            coordinator: self.reader.leader(id).await?,
            subordinates_moved: moved,
        })
    }

    /// Clear the coordinator flag. The branch stays attached to the now
    /// detached leader and every level in it is cleared.
    pub async fn demote(&self, id: &LeaderId) -> Result<LeaderNode> {
        let _guard = self.lock_trees(&[id]).await?;

        let node = self.reader.leader(id).await?;
        can_demote(&node)?;

        let branch = self.reader.branch(id).await?;
        let mut batch = Batch::new();
        let detached = stage_levels(&mut batch, branch.tree.as_ref(), |_| None);
        batch.update(&node, LeaderPatch::new().coordinator(false).level(None));

        self.commit(&batch).await?;
        info!("Demoted coordinator {} ({} leaders detached)", id, detached);

        self.reader.leader(id).await
    }

    /// Attach `id` under `parent_id`.
    pub async fn set_parent(&self, id: &LeaderId, parent_id: &LeaderId) -> Result<()> {
        self.attach(id, parent_id, Attach::SetParent).await
    }

    /// Move the branch rooted at `id` under `new_parent_id`.
    pub async fn move_branch(&self, id: &LeaderId, new_parent_id: &LeaderId) -> Result<()> {
        self.attach(id, new_parent_id, Attach::MoveBranch).await
    }

    /// Snip `id` off its parent. The branch follows it out of the tree.
    pub async fn remove(&self, id: &LeaderId) -> Result<()> {
        let _guard = self.lock_trees(&[id]).await?;

        let chain = self.reader.ancestry(id).await?;
        let node = &chain[0];
        can_remove(node)?;
        if node.parent_id.is_none() && node.hierarchy_level.is_none() {
            debug!("Leader {} is already detached", id);
            return Ok(());
        }

        let branch = self.reader.branch(id).await?;
        let mut batch = Batch::new();
        for ancestor in &chain[1..] {
            batch.check(ancestor);
        }
        let detached = stage_levels(&mut batch, branch.tree.as_ref(), |_| None);
        batch.update(node, LeaderPatch::new().parent(None).level(None));

        self.commit(&batch).await?;
        info!("Removed {} from its tree ({} descendants detached)", id, detached);
        Ok(())
    }

    /// Soft-delete a leader with no active subordinates.
    pub async fn deactivate(&self, id: &LeaderId) -> Result<LeaderNode> {
        let _guard = self.lock_trees(&[id]).await?;

        let node = self.reader.leader(id).await?;
        let limit = self.config().op_timeout;
        let children = bounded(limit, self.reader.store().list_children(id)).await?;
        let active = children.iter().filter(|c| c.is_active).count();
        can_deactivate(&node, active)?;

        let mut batch = Batch::new();
        for child in &children {
            batch.check(child);
        }
        batch.update(&node, LeaderPatch::new().active(false));

        self.commit(&batch).await?;
        info!("Deactivated leader {}", id);

        self.reader.leader(id).await
    }

    async fn attach(&self, id: &LeaderId, parent_id: &LeaderId, mode: Attach) -> Result<()> {
        if id == parent_id {
            return Err(match mode {
                Attach::SetParent => Rejection::ParentIsSelf(id.clone()),
                Attach::MoveBranch => Rejection::TargetInsideSameBranch {
                    root: id.clone(),
                    target: parent_id.clone(),
                },
            }
            .into());
        }

        let _guard = self.lock_trees(&[id, parent_id]).await?;
        let max_depth = self.config().max_depth;

        let node = self.reader.leader(id).await?;
        let parent_chain = self.reader.ancestry(parent_id).await?;
        let parent = &parent_chain[0];

        let branch = self.reader.branch(id).await?;
        let height = branch.tree.as_ref().map_or(0, TreeNode::height);

        let parent_of = |i: &LeaderId| {
            parent_chain
                .iter()
                .find(|n| &n.id == i)
                .and_then(|n| n.parent_id.clone())
        };
        match mode {
            Attach::SetParent => can_set_parent(&node, parent, max_depth, height, parent_of)?,
            Attach::MoveBranch => can_move_branch(&node, parent, max_depth, height, parent_of)?,
        }
        let level = resulting_level(parent)
            .ok_or_else(|| Rejection::ParentNotInTree(parent_id.clone()))?;

        let mut batch = Batch::new();
        for ancestor in &parent_chain {
            batch.check(ancestor);
        }
        let moved = stage_levels(&mut batch, branch.tree.as_ref(), |depth| Some(level + depth));
        batch.update(
            &node,
            LeaderPatch::new()
                .parent(Some(parent_id.clone()))
                .level(Some(level)),
        );

        self.commit(&batch).await?;
        info!(
            "Attached {} under {} at level {} ({} descendants rebased)",
            id, parent_id, level, moved
        );
        Ok(())
    }

    /// Lock the trees holding `ids`, then make sure they still hold them.
    async fn lock_trees(&self, ids: &[&LeaderId]) -> Result<TreeGuard> {
        let roots = self.roots_of(ids).await?;

        let limit = self.config().op_timeout;
        let guard = tokio::time::timeout(limit, self.locks.acquire(roots))
            .await
            .map_err(|_| Error::Timeout(limit))?;

        let current = self.roots_of(ids).await?;
        if let Some(moved) = current.iter().find(|r| !guard.covers(r)) {
            debug!("Tree root {} appeared while locking {:?}", moved, guard.roots());
            return Err(Error::ConcurrentModification { id: moved.clone() });
        }
        Ok(guard)
    }

    async fn roots_of(&self, ids: &[&LeaderId]) -> Result<Vec<LeaderId>> {
        let mut roots = Vec::with_capacity(ids.len());
        for id in ids {
            roots.push(self.reader.tree_root(id).await?);
        }
        Ok(roots)
    }

    async fn commit(&self, batch: &Batch) -> Result<()> {
        debug!(
            "Committing {} writes ({} updates)",
            batch.len(),
            batch.update_count()
        );
        bounded(self.config().op_timeout, self.reader.store().apply(batch)).await
    }
}

/// Stage the level of every descendant in `tree` (root excluded) as
/// `level_at(relative_depth)`. Rows already at their target level are only
/// version-checked. Returns the number of descendants.
fn stage_levels<F>(batch: &mut Batch, tree: Option<&TreeNode>, level_at: F) -> u64
where
    F: Fn(u32) -> Option<u32>,
{
    let Some(tree) = tree else {
        return 0;
    };

    let mut count = 0;
    for (depth, node) in tree.iter().filter(|(depth, _)| *depth > 0) {
        let target = level_at(depth);
        if node.leader.hierarchy_level == target {
            batch.check(&node.leader);
        } else {
            batch.update(&node.leader, LeaderPatch::new().level(target));
        }
        count += 1;
    }
    count
}
