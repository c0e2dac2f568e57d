//! Rejections raised by the invariant guard.

use rede_hierarchy::LeaderId;
use serde::Serialize;
use thiserror::Error;

/// Result type for guard checks.
pub type Result<T> = std::result::Result<T, Rejection>;

/// The rule a rejection protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Invariant {
    Acyclicity,
    RootDiscipline,
    SingleOwner,
    LevelConsistency,
    /// Lifecycle rules: promotion/demotion preconditions, soft deletion.
    Lifecycle,
}

impl std::fmt::Display for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acyclicity => write!(f, "acyclicity"),
            Self::RootDiscipline => write!(f, "root discipline"),
            Self::SingleOwner => write!(f, "single owner"),
            Self::LevelConsistency => write!(f, "level consistency"),
            Self::Lifecycle => write!(f, "lifecycle"),
        }
    }
}

/// A proposed mutation that would break the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The proposed parent is the node itself or one of its descendants.
    #[error("cycle detected: {parent} is a descendant of {node}")]
    CycleDetected { node: LeaderId, parent: LeaderId },

    /// A leader named as its own parent.
    #[error("leader {0} cannot be its own parent")]
    ParentIsSelf(LeaderId),

    /// The change would push part of the tree below the depth bound.
    #[error("maximum depth exceeded: depth {depth} > {max}")]
    MaxDepthExceeded { depth: u32, max: u32 },

    /// Promotion of a leader that already roots a tree.
    #[error("leader {0} is already a coordinator")]
    AlreadyCoordinator(LeaderId),

    /// Demotion or tree lookup on a leader that roots no tree.
    #[error("leader {0} is not a coordinator")]
    NotACoordinator(LeaderId),

    /// A branch cannot be moved onto its own root.
    #[error("target {target} lies inside the branch rooted at {root}")]
    TargetInsideSameBranch { root: LeaderId, target: LeaderId },

    /// Coordinators never sit below another leader.
    #[error("coordinator {0} cannot be given a parent; demote it first")]
    CoordinatorCannotHaveParent(LeaderId),

    /// Roots are detached by demotion, not by snipping.
    #[error("leader {0} is a tree root; demote it instead")]
    IsRoot(LeaderId),

    /// The proposed parent is not part of any tree, so no level can be derived.
    #[error("parent {0} is not attached to a coordinator tree")]
    ParentNotInTree(LeaderId),

    /// Soft-deleted leaders take no part in structural changes.
    #[error("leader {0} is inactive")]
    InactiveLeader(LeaderId),

    /// Deactivation would strand active children.
    #[error("leader {id} still has {count} active subordinates")]
    HasActiveSubordinates { id: LeaderId, count: usize },
}

impl Rejection {
    /// The invariant this rejection protects.
    pub fn invariant(&self) -> Invariant {
        match self {
            Self::CycleDetected { .. }
            | Self::ParentIsSelf(_)
            | Self::TargetInsideSameBranch { .. } => Invariant::Acyclicity,
            Self::MaxDepthExceeded { .. } => Invariant::Acyclicity,
            Self::CoordinatorCannotHaveParent(_) | Self::IsRoot(_) => Invariant::RootDiscipline,
            Self::ParentNotInTree(_) => Invariant::LevelConsistency,
            Self::AlreadyCoordinator(_)
            | Self::NotACoordinator(_)
            | Self::InactiveLeader(_)
            | Self::HasActiveSubordinates { .. } => Invariant::Lifecycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_leaders() {
        let r = Rejection::CycleDetected {
            node: LeaderId::from("a"),
            parent: LeaderId::from("c"),
        };
        assert_eq!(r.to_string(), "cycle detected: c is a descendant of a");

        let r = Rejection::MaxDepthExceeded { depth: 9, max: 8 };
        assert_eq!(r.to_string(), "maximum depth exceeded: depth 9 > 8");
    }

    #[test]
    fn every_rejection_maps_to_an_invariant() {
        let id = LeaderId::from("x");
        assert_eq!(Rejection::ParentIsSelf(id.clone()).invariant(), Invariant::Acyclicity);
        assert_eq!(
            Rejection::CoordinatorCannotHaveParent(id.clone()).invariant(),
            Invariant::RootDiscipline
        );
        assert_eq!(Rejection::IsRoot(id.clone()).invariant(), Invariant::RootDiscipline);
        assert_eq!(Rejection::ParentNotInTree(id.clone()).invariant(), Invariant::LevelConsistency);
        assert_eq!(Rejection::AlreadyCoordinator(id).invariant(), Invariant::Lifecycle);
    }
}
