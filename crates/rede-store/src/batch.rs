//! Field patches and versioned write batches.

use rede_hierarchy::{LeaderId, LeaderNode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Structural fields a write may change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderPatch {
    pub parent_id: Option<Option<LeaderId>>,
    pub is_coordinator: Option<bool>,
    pub hierarchy_level: Option<Option<u32>>,
    pub is_active: Option<bool>,
}

impl LeaderPatch {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn parent(mut self, parent: Option<LeaderId>) -> Self {
        self.parent_id = Some(parent);
        self
    }

    #[must_use]
    pub fn coordinator(mut self, is_coordinator: bool) -> Self {
        self.is_coordinator = Some(is_coordinator);
        self
    }

    #[must_use]
    pub fn level(mut self, level: Option<u32>) -> Self {
        self.hierarchy_level = Some(level);
        self
    }

    #[must_use]
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the patch in place. Does not touch the version.
    pub fn apply_to(&self, node: &mut LeaderNode) {
        if let Some(parent) = &self.parent_id {
            node.parent_id = parent.clone();
        }
        if let Some(flag) = self.is_coordinator {
            node.is_coordinator = flag;
        }
        if let Some(level) = self.hierarchy_level {
            node.hierarchy_level = level;
        }
        if let Some(active) = self.is_active {
            node.is_active = active;
        }
    }
}

/// One entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Assert a row is still at `version` without changing it.
    Check { id: LeaderId, version: u64 },
    /// Patch a row that must still be at `version`.
    Update {
        id: LeaderId,
        version: u64,
        patch: LeaderPatch,
    },
}

impl Write {
    pub fn id(&self) -> &LeaderId {
        match self {
            Self::Check { id, .. } | Self::Update { id, .. } => id,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Self::Check { version, .. } | Self::Update { version, .. } => *version,
        }
    }
}

/// Writes that commit together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    writes: Vec<Write>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, node: &LeaderNode) -> &mut Self {
        self.writes.push(Write::Check {
            id: node.id.clone(),
            version: node.version,
        });
        self
    }

    pub fn update(&mut self, node: &LeaderNode, patch: LeaderPatch) -> &mut Self {
        self.writes.push(Write::Update {
            id: node.id.clone(),
            version: node.version,
            patch,
        });
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Number of rows the batch modifies.
    pub fn update_count(&self) -> usize {
        self.writes
            .iter()
            .filter(|w| matches!(w, Write::Update { .. }))
            .count()
    }

    /// Verify every version against `current`, then produce the rows to store.
    ///
    /// Later updates to the same row see earlier ones; each updated row's
    /// version is bumped once.
    pub fn resolve<F>(&self, current: F) -> Result<Vec<LeaderNode>>
    where
        F: Fn(&LeaderId) -> Option<LeaderNode>,
    {
        let mut staged: Vec<LeaderNode> = Vec::new();

        for write in &self.writes {
            let row = current(write.id()).ok_or_else(|| StoreError::NotFound(write.id().clone()))?;
            if row.version != write.version() {
                return Err(StoreError::VersionConflict {
                    id: write.id().clone(),
                    expected: write.version(),
                    actual: row.version,
                });
            }
        }

        for write in &self.writes {
            let Write::Update { id, patch, .. } = write else {
                continue;
            };
            match staged.iter_mut().find(|n| &n.id == id) {
                Some(node) => patch.apply_to(node),
                None => {
                    let mut node = current(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
                    patch.apply_to(&mut node);
                    node.version += 1;
                    staged.push(node);
                }
            }
        }

        Ok(staged)
    }
}
