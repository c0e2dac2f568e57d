//! Subtree statistics.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

use crate::LeaderNode;

/// Totals over a node and all of its descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeStats {
    pub total_leaders: u64,
    pub total_cadastros: u64,
    pub total_pontos: i64,
}

impl SubtreeStats {
    /// Contribution of a single leader.
    pub fn of(leader: &LeaderNode) -> Self {
        Self {
            total_leaders: 1,
            total_cadastros: leader.cadastros,
            total_pontos: leader.pontuacao_total,
        }
    }
}

/// Saturating: totals pin at the numeric bounds instead of overflowing.
impl Add for SubtreeStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            total_leaders: self.total_leaders.saturating_add(rhs.total_leaders),
            total_cadastros: self.total_cadastros.saturating_add(rhs.total_cadastros),
            total_pontos: self.total_pontos.saturating_add(rhs.total_pontos),
        }
    }
}

impl AddAssign for SubtreeStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// A coordinator with the totals of its whole network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorSummary {
    pub coordinator: LeaderNode,
    pub total_leaders: u64,
    pub total_cadastros: u64,
    pub total_pontos: i64,
}

impl CoordinatorSummary {
    pub fn new(coordinator: LeaderNode, stats: SubtreeStats) -> Self {
        Self {
            coordinator,
            total_leaders: stats.total_leaders,
            total_cadastros: stats.total_cadastros,
            total_pontos: stats.total_pontos,
        }
    }

    pub fn stats(&self) -> SubtreeStats {
        SubtreeStats {
            total_leaders: self.total_leaders,
            total_cadastros: self.total_cadastros,
            total_pontos: self.total_pontos,
        }
    }
}
