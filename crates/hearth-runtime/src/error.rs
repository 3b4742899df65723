//! Runtime errors.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

/// Errors raised by the interpreter, the state store and its collaborators.
///
/// None of these are fatal to the dispatch loop: the caller reports them and
/// moves on to the next queued line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Command name not present in the command table.
    #[error("unknown command '{0}'")]
    UnknownCommand(SmolStr),

    /// A handler received a missing or malformed argument.
    #[error("{command}: invalid argument '{argument}' ({reason})")]
    InvalidArgument {
        command: SmolStr,
        argument: SmolStr,
        reason: SmolStr,
    },

    /// Storage region could not be opened, read or written.
    #[error("storage error '{0}'")]
    Storage(SmolStr),

    /// Storage region holds no document (absent or empty).
    #[error("no stored document in '{0}'")]
    MissingDocument(SmolStr),

    /// Stored document failed to parse or validate.
    #[error("invalid document '{0}'")]
    Document(SmolStr),

    /// Configuration error.
    #[error("invalid config '{0}'")]
    InvalidConfig(SmolStr),

    /// Console or network transport error.
    #[error("transport error '{0}'")]
    Transport(SmolStr),

    /// Messaging client error.
    #[error("messaging error '{0}'")]
    Messaging(SmolStr),

    /// Board or sensor collaborator error.
    #[error("device error '{0}'")]
    Device(SmolStr),

    /// A state observer rejected a change notification.
    #[error("observer error '{0}'")]
    Observer(SmolStr),
}

impl RuntimeError {
    /// Shorthand for [`RuntimeError::InvalidArgument`].
    pub fn invalid_argument(
        command: impl Into<SmolStr>,
        argument: impl Into<SmolStr>,
        reason: impl Into<SmolStr>,
    ) -> Self {
        Self::InvalidArgument {
            command: command.into(),
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// True for the "nothing stored yet" family of load failures.
    #[must_use]
    pub fn is_missing_document(&self) -> bool {
        matches!(self, Self::MissingDocument(_))
    }
}
