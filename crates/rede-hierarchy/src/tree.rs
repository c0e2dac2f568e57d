//! Tree reconstruction from flat leader rows.
//!
//! Two passes over the rows: index every row by id, then link each row to its
//! parent's child list. Assembly starts at the requested root and consumes
//! each row at most once, so malformed input (duplicate rows, parent cycles
//! outside the root's reach) cannot loop.

use std::collections::HashMap;

use serde::Serialize;

use crate::{LeaderId, LeaderNode, SubtreeStats};

/// A leader decorated with its children, valid for the duration of one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub leader: LeaderNode,
    pub children: Vec<TreeNode>,
}

/// Result of assembling a tree from a flat row set.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    /// The assembled tree, `None` if the root row was not in the set.
    pub tree: Option<TreeNode>,
    /// Rows whose declared parent was absent from the set.
    pub orphans: Vec<LeaderId>,
    /// Rows left out of the tree (orphans and everything hanging below them).
    pub excluded: usize,
}

impl BuildOutcome {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.excluded == 0
    }
}

/// Assemble the tree rooted at `root_id` from `rows`.
///
/// Rows whose parent is missing from `rows` are reported as orphans and left
/// out, together with their descendants. They are never re-attached at the
/// root.
pub fn build_tree(root_id: &LeaderId, rows: Vec<LeaderNode>) -> BuildOutcome {
    let total = rows.len();

    // Pass 1: id -> row. First occurrence wins on duplicates.
    let mut by_id: HashMap<LeaderId, LeaderNode> = HashMap::with_capacity(total);
    let mut order: Vec<LeaderId> = Vec::with_capacity(total);
    for row in rows {
        if !by_id.contains_key(&row.id) {
            order.push(row.id.clone());
            by_id.insert(row.id.clone(), row);
        }
    }

    if !by_id.contains_key(root_id) {
        return BuildOutcome {
            tree: None,
            orphans: Vec::new(),
            excluded: by_id.len(),
        };
    }

    // Pass 2: parent -> children.
    let mut children: HashMap<LeaderId, Vec<LeaderId>> = HashMap::new();
    let mut orphans = Vec::new();
    for id in &order {
        if id == root_id {
            continue;
        }
        let Some(row) = by_id.get(id) else { continue };
        match &row.parent_id {
            Some(parent) if by_id.contains_key(parent) => {
                children.entry(parent.clone()).or_default().push(id.clone());
            }
            _ => orphans.push(id.clone()),
        }
    }

    let tree = assemble(root_id, &mut by_id, &mut children);
    let excluded = by_id.len();

    BuildOutcome {
        tree,
        orphans,
        excluded,
    }
}

fn assemble(
    id: &LeaderId,
    by_id: &mut HashMap<LeaderId, LeaderNode>,
    children: &mut HashMap<LeaderId, Vec<LeaderId>>,
) -> Option<TreeNode> {
    let leader = by_id.remove(id)?;
    let child_ids = children.remove(id).unwrap_or_default();

    let mut kids: Vec<TreeNode> = child_ids
        .iter()
        .filter_map(|child| assemble(child, by_id, children))
        .collect();
    kids.sort_by(|a, b| {
        a.leader
            .name
            .cmp(&b.leader.name)
            .then_with(|| a.leader.id.cmp(&b.leader.id))
    });

    Some(TreeNode {
        leader,
        children: kids,
    })
}

impl TreeNode {
    pub fn leaf(leader: LeaderNode) -> Self {
        Self {
            leader,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &LeaderId {
        &self.leader.id
    }

    /// Number of descendants, excluding this node.
    pub fn count_descendants(&self) -> u64 {
        self.children
            .iter()
            .map(|child| 1 + child.count_descendants())
            .sum()
    }

    /// Leaders, referrals and score summed over this node and all descendants.
    pub fn aggregate(&self) -> SubtreeStats {
        self.children
            .iter()
            .fold(SubtreeStats::of(&self.leader), |acc, child| {
                acc + child.aggregate()
            })
    }

    /// Longest downward path in edges (a leaf has height 0).
    pub fn height(&self) -> u32 {
        self.children
            .iter()
            .map(|child| child.height() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Find a node anywhere in this subtree.
    pub fn find(&self, id: &LeaderId) -> Option<&TreeNode> {
        self.iter().map(|(_, node)| node).find(|node| node.id() == id)
    }

    /// Pre-order walk yielding `(relative_depth, node)`; this node has depth 0.
    pub fn iter(&self) -> TreeWalk<'_> {
        TreeWalk {
            stack: vec![(0, self)],
        }
    }

    /// Total nodes in the subtree, including this one.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Pre-order iterator over a [`TreeNode`].
#[derive(Debug)]
pub struct TreeWalk<'a> {
    stack: Vec<(u32, &'a TreeNode)>,
}

impl<'a> Iterator for TreeWalk<'a> {
    type Item = (u32, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        // Reverse so the first child is visited first.
        for child in node.children.iter().rev() {
            self.stack.push((depth + 1, child));
        }
        Some((depth, node))
    }
}
