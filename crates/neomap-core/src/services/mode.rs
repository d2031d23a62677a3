//! Interaction mode state machine (browse vs. create)

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::data::CoreError;
use crate::services::transactions::IntentKind;

/// UI mode of the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InteractionMode {
    #[default]
    Browse,
    Create,
}

impl InteractionMode {
    pub fn flipped(self) -> Self {
        match self {
            InteractionMode::Browse => InteractionMode::Create,
            InteractionMode::Create => InteractionMode::Browse,
        }
    }

    pub fn permits(self, kind: IntentKind) -> bool {
        kind.required_mode() == self
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionMode::Browse => write!(f, "browse"),
            InteractionMode::Create => write!(f, "create"),
        }
    }
}

/// Snapshot of the mode an intent was issued under.
///
/// The epoch increases on every toggle, so a context only compares equal to the
/// current one if no toggle happened in between, even one that flipped back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModeContext {
    pub mode: InteractionMode,
    pub epoch: u64,
}

/// Result of a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeTransition {
    pub from: InteractionMode,
    pub to: InteractionMode,
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub struct ModeStateMachine {
    mode: InteractionMode,
    epoch: u64,
}

impl ModeStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn context(&self) -> ModeContext {
        ModeContext {
            mode: self.mode,
            epoch: self.epoch,
        }
    }

    /// Flips the mode. Every intent issued before this call becomes stale.
    pub fn toggle(&mut self) -> ModeTransition {
        let from = self.mode;
        self.mode = from.flipped();
        self.epoch += 1;
        info!(from = %from, to = %self.mode, epoch = self.epoch, "Interaction mode toggled");
        ModeTransition {
            from,
            to: self.mode,
            epoch: self.epoch,
        }
    }

    /// Moves to `mode`, toggling only if it differs from the current one.
    pub fn set(&mut self, mode: InteractionMode) -> Option<ModeTransition> {
        if self.mode == mode {
            None
        } else {
            Some(self.toggle())
        }
    }

    /// Checks that `kind` may be issued now and returns the context to stamp on it.
    /// Suppressed intents are dropped, never queued.
    pub fn authorize(&self, kind: IntentKind) -> Result<ModeContext, CoreError> {
        if self.mode.permits(kind) {
            Ok(self.context())
        } else {
            debug!(kind = %kind, mode = %self.mode, "Intent suppressed by interaction mode");
            Err(CoreError::ModeViolation {
                kind,
                mode: self.mode,
            })
        }
    }

    pub fn is_current(&self, context: &ModeContext) -> bool {
        *context == self.context()
    }
}
