//! Mutation preconditions.
//!
//! Re-parenting and branch moves share one critical check: the proposed
//! parent's ancestor chain must not contain the node being moved. Otherwise
//! the node would end up below itself. Descendants of a moved node need no
//! individual validation, only a level offset.

use rede_hierarchy::{LeaderId, LeaderNode};

use crate::rejection::{Rejection, Result};

/// Walk upward from `start` (inclusive) through `parent_of`.
///
/// Fails with [`Rejection::MaxDepthExceeded`] if the chain does not end within
/// `max_depth + 1` links, which also catches cycles already present in the data.
pub fn ancestor_chain<F>(start: &LeaderId, max_depth: u32, parent_of: F) -> Result<Vec<LeaderId>>
where
    F: Fn(&LeaderId) -> Option<LeaderId>,
{
    let limit = max_depth as usize + 1;
    let mut chain = vec![start.clone()];
    let mut current = parent_of(start);

    while let Some(id) = current {
        if chain.len() >= limit {
            return Err(Rejection::MaxDepthExceeded {
                depth: chain.len() as u32,
                max: max_depth,
            });
        }
        current = parent_of(&id);
        chain.push(id);
    }

    Ok(chain)
}

/// Check that `node` may be placed under `parent`.
///
/// `subtree_height` is the height of the branch hanging below `node`; it
/// moves along and must still fit under `max_depth`.
pub fn can_set_parent<F>(
    node: &LeaderNode,
    parent: &LeaderNode,
    max_depth: u32,
    subtree_height: u32,
    parent_of: F,
) -> Result<()>
where
    F: Fn(&LeaderId) -> Option<LeaderId>,
{
    if parent.id == node.id {
        return Err(Rejection::ParentIsSelf(node.id.clone()));
    }
    check_attachment(node, parent, max_depth, subtree_height, parent_of)
}

/// Check that the branch rooted at `root` may be moved under `new_parent`.
pub fn can_move_branch<F>(
    root: &LeaderNode,
    new_parent: &LeaderNode,
    max_depth: u32,
    subtree_height: u32,
    parent_of: F,
) -> Result<()>
where
    F: Fn(&LeaderId) -> Option<LeaderId>,
{
    if new_parent.id == root.id {
        return Err(Rejection::TargetInsideSameBranch {
            root: root.id.clone(),
            target: new_parent.id.clone(),
        });
    }
    check_attachment(root, new_parent, max_depth, subtree_height, parent_of)
}

fn check_attachment<F>(
    node: &LeaderNode,
    parent: &LeaderNode,
    max_depth: u32,
    subtree_height: u32,
    parent_of: F,
) -> Result<()>
where
    F: Fn(&LeaderId) -> Option<LeaderId>,
{
    if node.is_coordinator {
        return Err(Rejection::CoordinatorCannotHaveParent(node.id.clone()));
    }
    if !node.is_active {
        return Err(Rejection::InactiveLeader(node.id.clone()));
    }
    if !parent.is_active {
        return Err(Rejection::InactiveLeader(parent.id.clone()));
    }

    let chain = ancestor_chain(&parent.id, max_depth, parent_of)?;
    if chain.contains(&node.id) {
        return Err(Rejection::CycleDetected {
            node: node.id.clone(),
            parent: parent.id.clone(),
        });
    }

    let Some(parent_level) = parent.hierarchy_level else {
        return Err(Rejection::ParentNotInTree(parent.id.clone()));
    };

    let deepest = parent_level + 1 + subtree_height;
    if deepest > max_depth {
        return Err(Rejection::MaxDepthExceeded {
            depth: deepest,
            max: max_depth,
        });
    }

    Ok(())
}

pub fn can_promote(node: &LeaderNode) -> Result<()> {
    if node.is_coordinator {
        return Err(Rejection::AlreadyCoordinator(node.id.clone()));
    }
    if !node.is_active {
        return Err(Rejection::InactiveLeader(node.id.clone()));
    }
    Ok(())
}

pub fn can_demote(node: &LeaderNode) -> Result<()> {
    if !node.is_coordinator {
        return Err(Rejection::NotACoordinator(node.id.clone()));
    }
    Ok(())
}

/// Coordinators leave their tree by demotion, not removal.
pub fn can_remove(node: &LeaderNode) -> Result<()> {
    if node.is_coordinator {
        return Err(Rejection::IsRoot(node.id.clone()));
    }
    Ok(())
}

/// Soft deletion is only allowed once nothing active hangs below the leader.
pub fn can_deactivate(node: &LeaderNode, active_children: usize) -> Result<()> {
    if !node.is_active {
        return Err(Rejection::InactiveLeader(node.id.clone()));
    }
    if active_children > 0 {
        return Err(Rejection::HasActiveSubordinates {
            id: node.id.clone(),
            count: active_children,
        });
    }
    Ok(())
}
