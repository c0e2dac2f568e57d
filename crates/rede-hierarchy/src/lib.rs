//! Rede Leader Hierarchy
//!
//! Data model for the leader hierarchy: flat leader records as stored, trees
//! reconstructed from them, and statistics folded over those trees.
//!
//! # Shape
//!
//! Leaders form one tree per coordinator. A coordinator is a root
//! (`parent_id = None`, level 0); every other attached leader has exactly one
//! parent and sits one level below it. Records that are not reachable from any
//! coordinator are "unattached" and carry no level.
//!
//! # Flat In, Tree Out
//!
//! The store only knows rows with a parent column. [`build_tree`] turns a flat
//! list of rows into a [`TreeNode`] in two passes (index by id, then link by
//! parent), and reports rows whose parent was not part of the list instead of
//! grafting them somewhere wrong.
//!
//! # Statistics
//!
//! `cadastros` and `pontuacao_total` are local to each record. Totals for a
//! subtree are always computed from the tree at hand ([`TreeNode::aggregate`])
//! and never written back.

mod leader;
mod stats;
mod tree;

pub use leader::{LeaderId, LeaderNode};
pub use stats::{CoordinatorSummary, SubtreeStats};
pub use tree::{build_tree, BuildOutcome, TreeNode, TreeWalk};

/// Level of a coordinator (tree root).
pub const ROOT_LEVEL: u32 = 0;

/// Default bound on tree depth for a tenant.
pub const DEFAULT_MAX_DEPTH: u32 = 32;

/// Largest result set the backing query engine returns in one page.
pub const DEFAULT_PAGE_CAP: usize = 1000;

