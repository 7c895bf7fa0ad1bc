//! Unit lifecycle state machine.
//!
//! A flat enum plus an explicit allowed-transitions table. Anything not
//! in the table is rejected with [`KnowledgeError::InvalidState`];
//! `Archived` is terminal.

use serde::{Deserialize, Serialize};

use crate::error::{KnowledgeError, Result};

/// Lifecycle state of a semantic unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Draft,
    Active,
    Deprecated,
    Archived,
}

impl UnitState {
    /// States this state may legally transition into.
    pub fn allowed_transitions(self) -> &'static [UnitState] {
        match self {
            UnitState::Draft => &[UnitState::Active],
            UnitState::Active => &[UnitState::Deprecated, UnitState::Archived],
            UnitState::Deprecated => &[UnitState::Active, UnitState::Archived],
            UnitState::Archived => &[],
        }
    }

    /// Whether `next` is a legal transition target from this state.
    pub fn can_transition_to(self, next: UnitState) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Lowercase label used in messages and audit records.
    pub fn as_str(self) -> &'static str {
        match self {
            UnitState::Draft => "draft",
            UnitState::Active => "active",
            UnitState::Deprecated => "deprecated",
            UnitState::Archived => "archived",
        }
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a transition, returning the new state on success.
pub fn check_transition(from: UnitState, to: UnitState) -> Result<UnitState> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(KnowledgeError::InvalidState(format!(
            "illegal transition {from} -> {to}"
        )))
    }
}
