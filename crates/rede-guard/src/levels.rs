//! Level consistency checks over reconstructed trees.

use rede_hierarchy::{LeaderId, LeaderNode, TreeNode, ROOT_LEVEL};
use serde::Serialize;

/// A leader whose stored level disagrees with its position in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelMismatch {
    pub id: LeaderId,
    pub recorded: Option<u32>,
    pub expected: u32,
}

/// Level a child of `parent` must carry, `None` if the parent is not in a tree.
pub fn resulting_level(parent: &LeaderNode) -> Option<u32> {
    parent.hierarchy_level.map(|level| level + 1)
}

/// Compare every stored level in `tree` against its depth below the root.
///
/// The root itself is expected at level 0.
pub fn check_levels(tree: &TreeNode) -> Vec<LevelMismatch> {
    tree.iter()
        .filter_map(|(depth, node)| {
            let expected = ROOT_LEVEL + depth;
            let recorded = node.leader.hierarchy_level;
            (recorded != Some(expected)).then(|| LevelMismatch {
                id: node.id().clone(),
                recorded,
                expected,
            })
        })
        .collect()
}
