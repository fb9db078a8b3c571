use serde::Serialize;

use crate::error::{CodecError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    Encoder,
    Decoder,
}

/// Lifecycle of one codec instance.
///
/// `Closed` is terminal. The only way back from `Configured` to
/// `Unconfigured` is `reset()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecState {
    #[default]
    Unconfigured,
    Configured,
    Closed,
}

impl CodecState {
    pub fn ensure_configurable(self) -> Result<()> {
        match self {
            CodecState::Closed => Err(CodecError::state("configure() called on a closed codec")),
            _ => Ok(()),
        }
    }

    /// encode/decode/flush are only legal once configured.
    pub fn ensure_configured(self, op: &str) -> Result<()> {
        match self {
            CodecState::Configured => Ok(()),
            other => Err(CodecError::state(format!(
                "{}() called on a codec in state {:?}",
                op, other
            ))),
        }
    }

    /// Returns `Ok(false)` when reset must be a silent no-op.
    ///
    /// A closed encoder rejects reset while a closed decoder ignores it.
    pub fn ensure_resettable(self, kind: CodecKind) -> Result<bool> {
        match (self, kind) {
            (CodecState::Closed, CodecKind::Encoder) => {
                Err(CodecError::state("reset() called on a closed encoder"))
            }
            (CodecState::Closed, CodecKind::Decoder) => Ok(false),
            _ => Ok(true),
        }
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;
