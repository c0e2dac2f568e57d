//! Aggregation Engine: per-coordinator and per-branch totals.

use rede_hierarchy::{CoordinatorSummary, LeaderId, LeaderNode, SubtreeStats};
use rede_store::NodeStore;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::reconstruct::{bounded, TreeReconstructor};

/// A parentless, non-coordinator leader that still has a branch below it.
///
/// These are what demotion and removal leave behind; they belong to no tree
/// until promoted or moved under one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetachedBranch {
    pub root: LeaderNode,
    pub descendants: u64,
}

/// Read-only statistics over reconstructed trees.
pub struct AggregationEngine<S: ?Sized> {
    reader: TreeReconstructor<S>,
}

impl<S: ?Sized> Clone for AggregationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
        }
    }
}

impl<S: NodeStore + ?Sized> AggregationEngine<S> {
    pub fn new(reader: TreeReconstructor<S>) -> Self {
        Self { reader }
    }

    /// Every active coordinator with its tree totals, ordered by name.
    pub async fn coordinators_with_stats(&self) -> Result<Vec<CoordinatorSummary>> {
        let limit = self.reader.config().op_timeout;
        let mut coordinators = bounded(limit, self.reader.store().list_coordinators()).await?;
        coordinators.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let mut summaries = Vec::with_capacity(coordinators.len());
        for coordinator in coordinators {
            let stats = self
                .reader
                .branch(&coordinator.id)
                .await?
                .tree
                .map(|tree| tree.aggregate())
                .unwrap_or_else(|| SubtreeStats::of(&coordinator));
            summaries.push(CoordinatorSummary::new(coordinator, stats));
        }

        debug!("Summarised {} coordinators", summaries.len());
        Ok(summaries)
    }

    /// Totals for a coordinator's whole network; `None` if it has no tree.
    pub async fn network_stats(&self, coordinator: &LeaderId) -> Result<Option<SubtreeStats>> {
        Ok(self
            .reader
            .leader_tree(coordinator)
            .await?
            .map(|tree| tree.aggregate()))
    }

    /// Totals for the branch rooted at any leader, the leader included.
    ///
    /// An inactive leader has no branch and yields empty totals.
    pub async fn subtree_stats(&self, id: &LeaderId) -> Result<SubtreeStats> {
        let leader = self.reader.leader(id).await?;
        if !leader.is_active {
            return Ok(SubtreeStats::default());
        }
        Ok(self
            .reader
            .branch(id)
            .await?
            .tree
            .map(|tree| tree.aggregate())
            .unwrap_or_default())
    }

    /// Detached leaders that still carry subordinates.
    pub async fn detached_branches(&self) -> Result<Vec<DetachedBranch>> {
        let limit = self.reader.config().op_timeout;
        let unattached = bounded(limit, self.reader.store().list_unattached()).await?;

        let mut branches = Vec::new();
        for root in unattached {
            let descendants = self
                .reader
                .branch(&root.id)
                .await?
                .tree
                .map_or(0, |tree| tree.count_descendants());
            if descendants > 0 {
                branches.push(DetachedBranch { root, descendants });
            }
        }
        Ok(branches)
    }
}
