//! Command table and line dispatch.

#![allow(missing_docs)]

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::cursor::TokenCursor;
use crate::error::RuntimeError;
use crate::runtime::RuntimeContext;

/// Handler invoked with the cursor positioned at the first argument.
pub type CommandHandler =
    Box<dyn Fn(&mut RuntimeContext, &mut TokenCursor<'_>) -> Result<(), RuntimeError>>;

/// Result of dispatching one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed { command: SmolStr },
    /// Blank line; nothing ran.
    Empty,
    Unknown { command: SmolStr },
    Failed { command: SmolStr, error: RuntimeError },
}

impl DispatchOutcome {
    #[must_use]
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }

    /// The error to report for this line, if any.
    #[must_use]
    pub fn error(&self) -> Option<RuntimeError> {
        match self {
            Self::Unknown { command } => Some(RuntimeError::UnknownCommand(command.clone())),
            Self::Failed { error, .. } => Some(error.clone()),
            Self::Executed { .. } | Self::Empty => None,
        }
    }
}

/// Name to handler map, built once at startup.
#[derive(Default)]
pub struct CommandTable {
    handlers: IndexMap<SmolStr, CommandHandler>,
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.handlers.len())
            .finish()
    }
}

impl CommandTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `handler`; an existing binding is replaced silently.
    pub fn register<F>(&mut self, name: impl Into<SmolStr>, handler: F)
    where
        F: Fn(&mut RuntimeContext, &mut TokenCursor<'_>) -> Result<(), RuntimeError> + 'static,
    {
        let name = name.into();
        if self.handlers.insert(name.clone(), Box::new(handler)).is_some() {
            debug!(command = name.as_str(), "handler replaced");
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandHandler> {
        self.handlers.get(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(SmolStr::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs one command line against `ctx`.
    ///
    /// Unknown commands and handler errors are logged and reported in the
    /// outcome; neither stops the caller from dispatching the next line.
    pub fn dispatch(&self, line: &str, ctx: &mut RuntimeContext) -> DispatchOutcome {
        let mut cursor = TokenCursor::new(line);
        let Some(name) = cursor.next_opt() else {
            return DispatchOutcome::Empty;
        };
        let command = SmolStr::new(name);
        let Some(handler) = self.handlers.get(name) else {
            warn!(command = name, line, "unknown command");
            return DispatchOutcome::Unknown { command };
        };
        debug!(line, "execute");
        match handler(ctx, &mut cursor) {
            Ok(()) => DispatchOutcome::Executed { command },
            Err(error) => {
                warn!(command = name, %error, "command failed");
                DispatchOutcome::Failed { command, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn last_registration_wins() {
        let mut table = CommandTable::new();
        table.register("foo", |ctx, _args| {
            ctx.store.write_live("which", 1);
            Ok(())
        });
        table.register("foo", |ctx, _args| {
            ctx.store.write_live("which", 2);
            Ok(())
        });
        assert_eq!(table.len(), 1);
        let mut runtime = Runtime::builder().build();
        let outcome = table.dispatch("foo", runtime.context_mut());
        assert!(outcome.is_executed());
        assert_eq!(runtime.store().read_int("which"), Some(2));
    }

    #[test]
    fn handler_sees_arguments_after_name() {
        let mut table = CommandTable::new();
        table.register("echo", |ctx, args| {
            let first = args.next();
            let second = args.next();
            ctx.store.write_live("args", format!("{first}|{second}"));
            Ok(())
        });
        let mut runtime = Runtime::builder().build();
        table.dispatch("  echo a  b ", runtime.context_mut());
        assert_eq!(runtime.store().read_str("args"), Some("a|b"));
    }

    #[test]
    fn unknown_and_empty_lines() {
        let table = CommandTable::new();
        let mut runtime = Runtime::builder().build();
        assert_eq!(
            table.dispatch("nope 1 2", runtime.context_mut()),
            DispatchOutcome::Unknown {
                command: "nope".into()
            }
        );
        assert_eq!(table.dispatch("   ", runtime.context_mut()), DispatchOutcome::Empty);
    }

    #[test]
    fn handler_error_is_reported() {
        let mut table = CommandTable::new();
        table.register("bad", |_ctx, _args| {
            Err(RuntimeError::invalid_argument("bad", "", "missing"))
        });
        let mut runtime = Runtime::builder().build();
        let outcome = table.dispatch("bad", runtime.context_mut());
        assert!(matches!(
            outcome.error(),
            Some(RuntimeError::InvalidArgument { .. })
        ));
    }
}
