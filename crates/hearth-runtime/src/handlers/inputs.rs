//! Operator inputs: numbers, times and free text.

use crate::command::CommandTable;
use crate::cursor::{human_text, TokenCursor};
use crate::error::RuntimeError;
use crate::runtime::RuntimeContext;
use crate::value::Partition;

use super::{key, required, required_number, save_now, WidgetLabel, WidgetPlacement};

pub(super) fn register(table: &mut CommandTable) {
    table.register("inputDigit", input_digit);
    table.register("digitSet", digit_set);
    table.register("inputTime", input_time);
    table.register("timeSet", time_set);
    table.register("text", text);
    table.register("textSet", text_set);
}

/// Checks that `name` is `<prefix><id>` with a non-empty id.
fn prefixed<'a>(command: &str, name: &'a str, prefix: &str) -> Result<&'a str, RuntimeError> {
    match name.strip_prefix(prefix) {
        Some(id) if !id.is_empty() => Ok(name),
        _ => Err(RuntimeError::invalid_argument(
            command,
            name,
            format!("expected {prefix}<id>"),
        )),
    }
}

/// Accepts `HH:MM` or `HH:MM:SS`.
fn time_of_day(command: &str, token: &str) -> Result<(), RuntimeError> {
    let invalid = || RuntimeError::invalid_argument(command, token, "expected HH:MM");
    let limits = [23u8, 59, 59];
    let mut count = 0;
    for (index, part) in token.split(':').enumerate() {
        let limit = *limits.get(index).ok_or_else(invalid)?;
        if part.len() != 2 {
            return Err(invalid());
        }
        let value: u8 = part.parse().map_err(|_| invalid())?;
        if value > limit {
            return Err(invalid());
        }
        count += 1;
    }
    if count < 2 {
        return Err(invalid());
    }
    Ok(())
}

/// `inputDigit <digitN> <label> <page> <value> <order>`
fn input_digit(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = prefixed("inputDigit", required("inputDigit", args, "name")?, "digit")?;
    let label = WidgetLabel::read("inputDigit", args)?;
    let value: i64 = required_number("inputDigit", args, "value")?;
    let placement = label.with_order("inputDigit", args)?;
    ctx.store.write_default(name, value, Partition::Persisted);
    placement.emit("inputNum", name, ctx);
    Ok(())
}

/// `digitSet <N> <value>`
fn digit_set(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let id = required("digitSet", args, "id")?;
    let value: i64 = required_number("digitSet", args, "value")?;
    ctx.store.write_persisted(key("digit", id), value);
    save_now(ctx)
}

/// `inputTime <timeN> <label> <page> <HH:MM> <order>`
fn input_time(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = prefixed("inputTime", required("inputTime", args, "name")?, "time")?;
    let label = WidgetLabel::read("inputTime", args)?;
    let value = required("inputTime", args, "value")?;
    time_of_day("inputTime", value)?;
    let placement = label.with_order("inputTime", args)?;
    ctx.store.write_default(name, value, Partition::Persisted);
    placement.emit("inputTime", name, ctx);
    Ok(())
}

/// `timeSet <N> <HH:MM>`
fn time_set(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let id = required("timeSet", args, "id")?;
    let value = required("timeSet", args, "value")?;
    time_of_day("timeSet", value)?;
    ctx.store.write_persisted(key("time", id), value);
    save_now(ctx)
}

/// `text <name> <label> <page> <order>`
fn text(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("text", args, "name")?;
    WidgetPlacement::read("text", args)?.emit("anydata", key("text", name), ctx);
    Ok(())
}

/// `textSet <name> <text>`
fn text_set(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("textSet", args, "name")?;
    let text = human_text(required("textSet", args, "text")?);
    ctx.store.write_live(key("text", name), text);
    Ok(())
}
