//! The hierarchy service: the single entry point callers use.

use std::sync::Arc;

use rede_guard::{check_levels, LevelMismatch};
use rede_hierarchy::{CoordinatorSummary, LeaderId, LeaderNode, SubtreeStats, TreeNode};
use rede_store::NodeStore;
use tracing::{info, warn};

use crate::aggregate::{AggregationEngine, DetachedBranch};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::mutation::{MutationEngine, PromotionReport};
use crate::reconstruct::TreeReconstructor;

/// Target for role-change events, for subscribers that notify people.
pub const ROLE_EVENTS: &str = "rede::roles";

/// Reads and mutations over one tenant's leader hierarchy.
pub struct HierarchyService<S: ?Sized> {
    reader: TreeReconstructor<S>,
    mutations: MutationEngine<S>,
    aggregation: AggregationEngine<S>,
}

impl<S: ?Sized> Clone for HierarchyService<S> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            mutations: self.mutations.clone(),
            aggregation: self.aggregation.clone(),
        }
    }
}

impl<S: NodeStore + ?Sized> HierarchyService<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let reader = TreeReconstructor::new(store, config);
        Self {
            mutations: MutationEngine::with_reader(reader.clone()),
            aggregation: AggregationEngine::new(reader.clone()),
            reader,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.reader.config()
    }

    pub fn store(&self) -> &Arc<S> {
        self.reader.store()
    }

    // Reads

    pub async fn list_coordinators_with_stats(&self) -> Result<Vec<CoordinatorSummary>> {
        self.aggregation.coordinators_with_stats().await
    }

    pub async fn get_leader_tree(&self, coordinator: &LeaderId) -> Result<Option<TreeNode>> {
        self.reader.leader_tree(coordinator).await
    }

    pub async fn get_coordinator_network_stats(
        &self,
        coordinator: &LeaderId,
    ) -> Result<Option<SubtreeStats>> {
        self.aggregation.network_stats(coordinator).await
    }

    pub async fn get_subtree_stats(&self, id: &LeaderId) -> Result<SubtreeStats> {
        self.aggregation.subtree_stats(id).await
    }

    /// `id` and each of its ancestors, nearest first.
    pub async fn ancestry_path(&self, id: &LeaderId) -> Result<Vec<LeaderNode>> {
        self.reader.ancestry(id).await
    }

    pub async fn detached_branches(&self) -> Result<Vec<DetachedBranch>> {
        self.aggregation.detached_branches().await
    }

    /// Leaders in a coordinator's tree whose recorded level disagrees with
    /// their depth. Empty for a healthy tree.
    pub async fn audit_tree(&self, coordinator: &LeaderId) -> Result<Vec<LevelMismatch>> {
        let Some(tree) = self.reader.leader_tree(coordinator).await? else {
            return Ok(Vec::new());
        };
        let mismatches = check_levels(&tree);
        if !mismatches.is_empty() {
            warn!(
                "Tree {} has {} leaders at the wrong level",
                coordinator,
                mismatches.len()
            );
        }
        Ok(mismatches)
    }

    // Mutations

    pub async fn promote_to_coordinator(&self, id: &LeaderId) -> Result<LeaderNode> {
        let report = self.mutations.promote_with_subordinates(id).await?;
        info!(
            target: ROLE_EVENTS,
            leader = %id,
            subordinates = report.subordinates_moved,
            "leader promoted to coordinator"
        );
        Ok(report.coordinator)
    }

    pub async fn promote_to_coordinator_with_subordinates(
        &self,
        id: &LeaderId,
    ) -> Result<PromotionReport> {
        let report = self.mutations.promote_with_subordinates(id).await?;
        info!(
            target: ROLE_EVENTS,
            leader = %id,
            subordinates = report.subordinates_moved,
            "leader promoted to coordinator"
        );
        Ok(report)
    }

    pub async fn demote_coordinator(&self, id: &LeaderId) -> Result<LeaderNode> {
        let leader = self.mutations.demote(id).await?;
        info!(target: ROLE_EVENTS, leader = %id, "coordinator demoted");
        Ok(leader)
    }

    pub async fn set_parent_leader(&self, id: &LeaderId, parent: &LeaderId) -> Result<()> {
        self.mutations.set_parent(id, parent).await
    }

    pub async fn remove_from_tree(&self, id: &LeaderId) -> Result<()> {
        self.mutations.remove(id).await
    }

    pub async fn move_leader_branch(&self, id: &LeaderId, new_parent: &LeaderId) -> Result<()> {
        self.mutations.move_branch(id, new_parent).await
    }

    pub async fn deactivate_leader(&self, id: &LeaderId) -> Result<LeaderNode> {
        self.mutations.deactivate(id).await
    }
}
