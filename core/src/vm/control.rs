use std::fmt;
use std::sync::Arc;

use crate::val::{BlockValue, Val};

use super::ActivationId;

/// Ways an activation can end other than by returning a value. Travels up the
/// native call stack as the error half of [`Completion`]; every call site
/// either handles the variant addressed to it or passes it on unchanged.
pub enum Unwind {
    /// `^value` from a block whose home activation is still on the stack.
    NonLocalReturn { target: ActivationId, value: Val },
    /// `^value` from a block whose home activation has already returned.
    EscapedBlock { block: Arc<BlockValue>, value: Val },
    /// Replay the activation that issued the send from its first instruction.
    Restart,
    Error(anyhow::Error),
}

pub type Completion<T = Val> = Result<T, Unwind>;

impl Unwind {
    /// Converts an unwind that escaped every handler into a host error.
    pub fn into_error(self) -> anyhow::Error {
        match self {
            Unwind::Error(e) => e,
            Unwind::NonLocalReturn { target, .. } => {
                anyhow::anyhow!("non-local return to activation {:?} found no target", target)
            }
            Unwind::EscapedBlock { block, .. } => {
                anyhow::anyhow!("escaped block {} was not handled", block.method().signature())
            }
            Unwind::Restart => anyhow::anyhow!("restart requested outside of any activation"),
        }
    }
}

impl From<anyhow::Error> for Unwind {
    fn from(e: anyhow::Error) -> Self {
        Unwind::Error(e)
    }
}

impl fmt::Debug for Unwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unwind::NonLocalReturn { target, value } => {
                write!(f, "NonLocalReturn({:?}, {:?})", target, value)
            }
            Unwind::EscapedBlock { value, .. } => write!(f, "EscapedBlock({:?})", value),
            Unwind::Restart => f.write_str("Restart"),
            Unwind::Error(e) => write!(f, "Error({e:#})"),
        }
    }
}
