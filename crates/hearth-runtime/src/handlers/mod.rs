//! Built-in command handlers.

#![allow(missing_docs)]

use std::str::FromStr;

use smol_str::SmolStr;

use crate::command::CommandTable;
use crate::cursor::{human_text, TokenCursor};
use crate::error::RuntimeError;
use crate::runtime::RuntimeContext;
use crate::widgets::{WidgetDescriptor, WidgetSink};

mod actuators;
mod inputs;
mod sensors;
mod system;

/// Registers the full built-in command set.
pub fn register_defaults(table: &mut CommandTable) {
    actuators::register(table);
    inputs::register(table);
    sensors::register(table);
    system::register(table);
}

/// Next token, or `InvalidArgument` naming `what` when the line ran out.
fn required<'a>(
    command: &str,
    args: &mut TokenCursor<'a>,
    what: &str,
) -> Result<&'a str, RuntimeError> {
    args.next_opt()
        .ok_or_else(|| RuntimeError::invalid_argument(command, what, "missing"))
}

fn number<T: FromStr>(command: &str, token: &str) -> Result<T, RuntimeError> {
    token
        .parse()
        .map_err(|_| RuntimeError::invalid_argument(command, token, "not a number"))
}

fn required_number<T: FromStr>(
    command: &str,
    args: &mut TokenCursor<'_>,
    what: &str,
) -> Result<T, RuntimeError> {
    let token = required(command, args, what)?;
    number(command, token)
}

/// Binary state argument; only `0` and `1` are accepted.
fn required_state(
    command: &str,
    args: &mut TokenCursor<'_>,
) -> Result<i64, RuntimeError> {
    let token = required(command, args, "state")?;
    match token {
        "0" => Ok(0),
        "1" => Ok(1),
        _ => Err(RuntimeError::invalid_argument(command, token, "expected 0 or 1")),
    }
}

/// Pin argument; `na` declares a virtual element with no pin.
fn optional_pin(command: &str, token: &str) -> Result<Option<u8>, RuntimeError> {
    if token.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    number(command, token).map(Some)
}

fn key(prefix: &str, name: &str) -> SmolStr {
    SmolStr::new(format!("{prefix}{name}"))
}

/// `<label> <page>` of a widget declaration. The trailing `<order>` comes
/// after any command-specific tokens and is read by `with_order`.
struct WidgetLabel {
    label: SmolStr,
    page: SmolStr,
}

impl WidgetLabel {
    fn read(command: &str, args: &mut TokenCursor<'_>) -> Result<Self, RuntimeError> {
        let label = human_text(required(command, args, "label")?);
        let page = human_text(required(command, args, "page")?);
        Ok(Self { label, page })
    }

    fn with_order(
        self,
        command: &str,
        args: &mut TokenCursor<'_>,
    ) -> Result<WidgetPlacement, RuntimeError> {
        let order = required_number(command, args, "order")?;
        Ok(WidgetPlacement {
            label: self.label,
            page: self.page,
            order,
        })
    }
}

/// Fully parsed widget placement. Declarations read every token before
/// touching the store, so a malformed line leaves no trace.
struct WidgetPlacement {
    label: SmolStr,
    page: SmolStr,
    order: i32,
}

impl WidgetPlacement {
    /// `<label> <page> <order>` with nothing in between.
    fn read(command: &str, args: &mut TokenCursor<'_>) -> Result<Self, RuntimeError> {
        WidgetLabel::read(command, args)?.with_order(command, args)
    }

    fn emit(self, widget: &str, key: impl Into<SmolStr>, ctx: &mut RuntimeContext) {
        ctx.widgets.emit(WidgetDescriptor::new(
            widget, key, self.label, self.page, self.order,
        ));
    }
}

fn save_now(ctx: &RuntimeContext) -> Result<(), RuntimeError> {
    ctx.save().map(|_| ())
}

/// Re-labels an argument error raised by a shared helper with the command name.
fn in_command(command: &str, err: RuntimeError) -> RuntimeError {
    match err {
        RuntimeError::InvalidArgument {
            argument, reason, ..
        } => RuntimeError::InvalidArgument {
            command: command.into(),
            argument,
            reason,
        },
        other => other,
    }
}
