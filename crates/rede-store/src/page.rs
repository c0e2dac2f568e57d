//! Paged transitive-closure queries.

use std::collections::{HashMap, HashSet, VecDeque};

use rede_hierarchy::{LeaderId, LeaderNode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Opaque continuation token handed out with a page.
///
/// Encodes the store generation the page was cut from and the offset of the
/// next row, as `{generation}:{offset}`. A token is only honoured while the
/// store is still at that generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(pub String);

impl PageToken {
    pub fn new(generation: u64, offset: usize) -> Self {
        Self(format!("{generation}:{offset}"))
    }

    /// `(generation, offset)` carried by the token.
    pub fn parts(&self) -> Result<(u64, usize)> {
        let invalid = || StoreError::InvalidToken(self.0.clone());
        let (generation, offset) = self.0.split_once(':').ok_or_else(invalid)?;
        Ok((
            generation.parse().map_err(|_| invalid())?,
            offset.parse().map_err(|_| invalid())?,
        ))
    }
}

/// One page of a descendant query.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub nodes: Vec<LeaderNode>,
    /// Set whenever the page came back full; the next call may still be empty.
    pub next_token: Option<PageToken>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Breadth-first closure of `root` (inclusive) over a flat row set.
///
/// Inactive rows are walked through but not emitted, which is how a
/// recursive query filtered on `is_active` behaves.
pub(crate) fn closure<'a, I>(rows: I, root: &LeaderId) -> Vec<LeaderNode>
where
    I: IntoIterator<Item = &'a LeaderNode>,
{
    let mut by_id: HashMap<&LeaderId, &LeaderNode> = HashMap::new();
    let mut children: HashMap<&LeaderId, Vec<&LeaderNode>> = HashMap::new();
    for row in rows {
        by_id.insert(&row.id, row);
        if let Some(parent) = &row.parent_id {
            children.entry(parent).or_default().push(row);
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| a.id.cmp(&b.id));
    }

    let Some(&start) = by_id.get(root) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut seen: HashSet<&LeaderId> = HashSet::new();
    let mut queue: VecDeque<&LeaderNode> = VecDeque::from([start]);
    seen.insert(&start.id);

    while let Some(node) = queue.pop_front() {
        if node.is_active {
            out.push(node.clone());
        }
        for &child in children.get(&node.id).into_iter().flatten() {
            if seen.insert(&child.id) {
                queue.push_back(child);
            }
        }
    }

    out
}

/// Cut one page out of a closure computed at store `generation`.
///
/// Fails with [`StoreError::StaleToken`] if the token was issued at another
/// generation: offsets into a closure that has since changed would skip or
/// repeat rows.
pub(crate) fn slice_page(
    all: Vec<LeaderNode>,
    page_size: usize,
    token: Option<&PageToken>,
    generation: u64,
) -> Result<Page> {
    let offset = match token {
        Some(token) => {
            let (issued, offset) = token.parts()?;
            if issued != generation {
                return Err(StoreError::StaleToken {
                    issued,
                    current: generation,
                });
            }
            offset
        }
        None => 0,
    };
    let nodes: Vec<LeaderNode> = all.into_iter().skip(offset).take(page_size).collect();
    let next_token =
        (nodes.len() == page_size).then(|| PageToken::new(generation, offset + page_size));
    Ok(Page { nodes, next_token })
}
