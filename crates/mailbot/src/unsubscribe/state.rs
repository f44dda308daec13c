//! Lifecycle of a single unsubscribe attempt.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::Outcome;

use super::error::{ExecutionError, Result};

/// `Pending → Attempting → {Succeeded, RequiresManualConfirmation, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Attempting,
    Succeeded,
    RequiresManualConfirmation,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Succeeded | AttemptState::RequiresManualConfirmation | AttemptState::Failed
        )
    }

    /// Moves to `next`, refusing anything but the forward edges of the
    /// lifecycle. A terminal state never changes.
    pub fn transition(self, next: AttemptState) -> Result<AttemptState> {
        let allowed = match (self, next) {
            (AttemptState::Pending, AttemptState::Attempting) => true,
            (AttemptState::Attempting, to) => to.is_terminal(),
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(ExecutionError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// The persisted outcome for a terminal state.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            AttemptState::Succeeded => Some(Outcome::Succeeded),
            AttemptState::RequiresManualConfirmation => Some(Outcome::RequiresManualConfirmation),
            AttemptState::Failed => Some(Outcome::Failed),
            AttemptState::Pending | AttemptState::Attempting => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Pending => "pending",
            AttemptState::Attempting => "attempting",
            AttemptState::Succeeded => "succeeded",
            AttemptState::RequiresManualConfirmation => "requires_manual_confirmation",
            AttemptState::Failed => "failed",
        }
    }
}

impl From<Outcome> for AttemptState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Succeeded => AttemptState::Succeeded,
            Outcome::RequiresManualConfirmation => AttemptState::RequiresManualConfirmation,
            Outcome::Failed => AttemptState::Failed,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
