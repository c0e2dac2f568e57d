//! Invariant Guard
//!
//! Every structural change to the leader hierarchy is checked here before it
//! is written. The checks are pure: they see the node being changed, the
//! proposed target, and a lookup for the target's ancestry, and they answer
//! with `Ok(())` or a [`Rejection`] that names the invariant it protects.
//!
//! # Invariants
//!
//! 1. **Acyclicity**: no leader is its own ancestor and every chain ends
//!    within the tenant's maximum depth.
//! 2. **Root discipline**: coordinators have no parent; parented leaders are
//!    not coordinators.
//! 3. **Single owner**: each leader has one parent, so trees are disjoint.
//! 4. **Level consistency**: a leader sits one level below its parent.
//! 5. **Local counts**: referral and score counters are never aggregated
//!    into records, so structural changes never touch them.
//!
//! # Ancestry Lookup
//!
//! Guards never fetch anything. Callers pass `parent_of`, a closure mapping
//! an id to its parent id, backed by whatever the caller has already read.
//! The walk is bounded by the maximum depth, so a corrupted chain is rejected
//! instead of looping.

mod levels;
mod rejection;
mod rules;

pub use levels::{check_levels, resulting_level, LevelMismatch};
pub use rejection::{Invariant, Rejection, Result};
pub use rules::{
    ancestor_chain, can_deactivate, can_demote, can_move_branch, can_promote, can_remove,
    can_set_parent,
};

#[cfg(test)]
mod tests {
    use super::*;
    use rede_hierarchy::{LeaderId, LeaderNode};
    use std::collections::HashMap;

    #[test]
    fn cycle_rejection_names_acyclicity() {
        // A -> B -> C
        let a = LeaderNode::coordinator("a", "A");
        let b = LeaderNode::new("b", "B").under(&a);
        let c = LeaderNode::new("c", "C").under(&b);
        let parents: HashMap<LeaderId, LeaderId> =
            [(b.id.clone(), a.id.clone()), (c.id.clone(), b.id.clone())]
                .into_iter()
                .collect();

        // A is a coordinator, so clear the flag to isolate the cycle check.
        let mut a_leaf = a.clone();
        a_leaf.is_coordinator = false;

        let rejection =
            can_set_parent(&a_leaf, &c, 10, 2, |id| parents.get(id).cloned()).unwrap_err();
        assert!(matches!(rejection, Rejection::CycleDetected { .. }));
        assert_eq!(rejection.invariant(), Invariant::Acyclicity);
    }

    mod properties {
        use crate::*;
        use proptest::prelude::*;
        use rede_hierarchy::{LeaderId, LeaderNode};
        use std::collections::HashMap;

        const MAX_DEPTH: u32 = 12;

        /// Leader `i > 0` hangs under `parents[i - 1] % i`, so the start is a valid tree.
        fn model(parents: &[usize]) -> HashMap<LeaderId, LeaderNode> {
            let mut nodes: Vec<LeaderNode> = vec![LeaderNode::coordinator("n0", "N0")];
            for (i, p) in parents.iter().enumerate() {
                let i = i + 1;
                let parent = nodes[p % i].clone();
                let mut node = LeaderNode::new(format!("n{i}"), format!("N{i}"));
                node.parent_id = Some(parent.id.clone());
                node.hierarchy_level = parent.hierarchy_level.map(|l| l + 1);
                nodes.push(node);
            }
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect()
        }

        fn height(nodes: &HashMap<LeaderId, LeaderNode>, id: &LeaderId) -> u32 {
            nodes
                .values()
                .filter(|n| n.parent_id.as_ref() == Some(id))
                .map(|n| height(nodes, &n.id) + 1)
                .max()
                .unwrap_or(0)
        }

        fn relevel(nodes: &mut HashMap<LeaderId, LeaderNode>, id: &LeaderId, level: u32) {
            if let Some(node) = nodes.get_mut(id) {
                node.hierarchy_level = Some(level);
            }
            let children: Vec<LeaderId> = nodes
                .values()
                .filter(|n| n.parent_id.as_ref() == Some(id))
                .map(|n| n.id.clone())
                .collect();
            for child in children {
                relevel(nodes, &child, level + 1);
            }
        }

        proptest! {
            #[test]
            fn accepted_moves_never_create_cycles(
                parents in proptest::collection::vec(0usize..64, 1..12),
                moves in proptest::collection::vec((0usize..24, 0usize..24), 0..40),
            ) {
                let mut nodes = model(&parents);
                let count = nodes.len();

                for (from, to) in moves {
                    let node_id = LeaderId::new(format!("n{}", from % count));
                    let target_id = LeaderId::new(format!("n{}", to % count));
                    let node = nodes[&node_id].clone();
                    let target = nodes[&target_id].clone();
                    let h = height(&nodes, &node_id);

                    let verdict = {
                        let lookup = |i: &LeaderId| nodes.get(i).and_then(|n| n.parent_id.clone());
                        can_move_branch(&node, &target, MAX_DEPTH, h, lookup)
                    };
                    if verdict.is_ok() {
                        let level = resulting_level(&target).unwrap();
                        nodes.get_mut(&node_id).unwrap().parent_id = Some(target_id.clone());
                        relevel(&mut nodes, &node_id, level);
                    }

                    for id in nodes.keys() {
                        let chain = ancestor_chain(id, MAX_DEPTH, |i| nodes.get(i).and_then(|n| n.parent_id.clone()));
                        prop_assert!(chain.is_ok(), "chain from {} did not terminate", id);
                        let chain = chain.unwrap();
                        prop_assert_eq!(chain.iter().filter(|c| *c == id).count(), 1);
                        prop_assert_eq!(nodes[id].hierarchy_level, Some(chain.len() as u32 - 1));
                    }
                }
            }
        }
    }
}
