//! Leader records as persisted by the node store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ROOT_LEVEL;

/// Opaque leader identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaderId(pub String);

impl LeaderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LeaderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LeaderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A person who recruits other participants.
///
/// Rows are flat: the hierarchy lives entirely in `parent_id`,
/// `is_coordinator` and `hierarchy_level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderNode {
    pub id: LeaderId,

    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    /// Parent leader. `None` for coordinators and for unattached records.
    #[serde(default)]
    pub parent_id: Option<LeaderId>,

    /// A coordinator is a tree root and never has a parent.
    #[serde(default)]
    pub is_coordinator: bool,

    /// Depth below the nearest coordinator (root = 0), `None` when not in a tree.
    #[serde(default)]
    pub hierarchy_level: Option<u32>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Referrals attributed directly to this leader (not descendants).
    #[serde(default)]
    pub cadastros: u64,

    /// Score attributed directly to this leader (not descendants).
    #[serde(default)]
    pub pontuacao_total: i64,

    /// Row version, bumped by the store on every write.
    #[serde(default)]
    pub version: u64,
}

fn default_active() -> bool {
    true
}

impl LeaderNode {
    /// Create an unattached, active leader as onboarding does.
    pub fn new(id: impl Into<LeaderId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            phone: None,
            parent_id: None,
            is_coordinator: false,
            hierarchy_level: None,
            is_active: true,
            cadastros: 0,
            pontuacao_total: 0,
            version: 0,
        }
    }

    /// Create a coordinator root.
    pub fn coordinator(id: impl Into<LeaderId>, name: impl Into<String>) -> Self {
        let mut node = Self::new(id, name);
        node.is_coordinator = true;
        node.hierarchy_level = Some(ROOT_LEVEL);
        node
    }

    /// Attach under `parent`, deriving the level from it.
    #[must_use]
    pub fn under(mut self, parent: &LeaderNode) -> Self {
        self.parent_id = Some(parent.id.clone());
        self.hierarchy_level = parent.hierarchy_level.map(|l| l + 1);
        self
    }

    #[must_use]
    pub fn with_cadastros(mut self, cadastros: u64) -> Self {
        self.cadastros = cadastros;
        self
    }

    #[must_use]
    pub fn with_pontos(mut self, pontos: i64) -> Self {
        self.pontuacao_total = pontos;
        self
    }

    #[must_use]
    pub fn with_contact(mut self, email: Option<String>, phone: Option<String>) -> Self {
        self.email = email;
        self.phone = phone;
        self
    }

    /// Whether the record is a root or hangs below one.
    pub fn is_attached(&self) -> bool {
        self.is_coordinator || self.parent_id.is_some()
    }

    /// Root discipline: coordinators have no parent, parented nodes are not coordinators.
    pub fn respects_root_discipline(&self) -> bool {
        !(self.is_coordinator && self.parent_id.is_some())
    }
}
