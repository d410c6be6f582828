//! Per-capability invocation ceilings for a single run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::capability::CapabilityKind;

/// Usage counter for one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetEntry {
    pub used: u32,
    pub limit: u32,
}

impl BudgetEntry {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

/// Result of asking the tracker for permission to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    /// Dispatch allowed; `remaining` is what is left after this call.
    Granted { remaining: u32 },
    /// Ceiling reached; the call must not run.
    Exhausted { limit: u32 },
    /// The capability is not tracked (submissions).
    Unbounded,
}

/// Call counts per capability. Counters only move upward within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetTracker {
    entries: BTreeMap<CapabilityKind, BudgetEntry>,
}

impl BudgetTracker {
    /// Build a tracker from `(capability, ceiling)` pairs.
    ///
    /// Untracked capabilities are treated as unbounded, so submissions should
    /// not be listed.
    pub fn with_limits(limits: impl IntoIterator<Item = (CapabilityKind, u32)>) -> Self {
        let entries = limits
            .into_iter()
            .filter(|(kind, _)| kind.is_budgeted())
            .map(|(kind, limit)| (kind, BudgetEntry { used: 0, limit }))
            .collect();
        Self { entries }
    }

    /// Check the ceiling and, when allowed, count the call.
    pub fn try_consume(&mut self, kind: CapabilityKind) -> BudgetCheck {
        let Some(entry) = self.entries.get_mut(&kind) else {
            return BudgetCheck::Unbounded;
        };
        if entry.used >= entry.limit {
            return BudgetCheck::Exhausted { limit: entry.limit };
        }
        entry.used += 1;
        BudgetCheck::Granted {
            remaining: entry.remaining(),
        }
    }

    pub fn entry(&self, kind: CapabilityKind) -> Option<BudgetEntry> {
        self.entries.get(&kind).copied()
    }

    pub fn used(&self, kind: CapabilityKind) -> u32 {
        self.entries.get(&kind).map_or(0, |entry| entry.used)
    }

    /// Capabilities that may be offered on the next agent turn.
    pub fn offered(&self) -> Vec<CapabilityKind> {
        CapabilityKind::ALL
            .into_iter()
            .filter(|kind| match self.entries.get(kind) {
                Some(entry) => entry.remaining() > 0,
                None => !kind.is_budgeted(),
            })
            .collect()
    }

    /// Tracked capabilities with budget left that were never called.
    pub fn unused(&self) -> Vec<CapabilityKind> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.used == 0 && entry.limit > 0)
            .map(|(kind, _)| *kind)
            .collect()
    }
}
