//! Switches, buttons, raw pins and PWM outputs.

use crate::board::PWM_MAX;
use crate::command::CommandTable;
use crate::cursor::TokenCursor;
use crate::error::RuntimeError;
use crate::runtime::RuntimeContext;
use crate::value::Partition;

use super::{
    key, optional_pin, required, required_number, required_state, save_now, WidgetLabel,
};

pub(super) fn register(table: &mut CommandTable) {
    table.register("switch", switch);
    table.register("button", button);
    table.register("buttonSet", button_set);
    table.register("buttonChange", button_change);
    table.register("pinSet", pin_set);
    table.register("pinChange", pin_change);
    table.register("pwm", pwm);
    table.register("pwmSet", pwm_set);
}

fn drive_digital(ctx: &mut RuntimeContext, key: &str, high: bool) -> Result<(), RuntimeError> {
    match ctx.outputs.get(key) {
        Some(&pin) => ctx.board.digital_write(pin, high),
        None => Ok(()),
    }
}

fn drive_pwm(ctx: &mut RuntimeContext, key: &str, duty: i64) -> Result<(), RuntimeError> {
    let Some(&pin) = ctx.outputs.get(key) else {
        return Ok(());
    };
    let duty = u16::try_from(duty)
        .map_err(|_| RuntimeError::Device(format!("pwm duty {duty} out of range").into()))?;
    ctx.board.pwm_write(pin, duty)
}

fn pwm_value(command: &str, args: &mut TokenCursor<'_>) -> Result<i64, RuntimeError> {
    let value: i64 = required_number(command, args, "value")?;
    if !(0..=i64::from(PWM_MAX)).contains(&value) {
        return Err(RuntimeError::invalid_argument(
            command,
            value.to_string(),
            format!("expected 0..={PWM_MAX}"),
        ));
    }
    Ok(value)
}

/// `switch <name> <state>`
fn switch(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("switch", args, "name")?;
    let state = required_state("switch", args)?;
    let key = key("switch", name);
    ctx.store.write_persisted(key.clone(), state);
    drive_digital(ctx, &key, state != 0)?;
    save_now(ctx)
}

/// `button <name> <pin|na> <label> <page> <state> <order>`
fn button(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("button", args, "name")?;
    let pin = optional_pin("button", required("button", args, "pin")?)?;
    let label = WidgetLabel::read("button", args)?;
    let state = required_state("button", args)?;
    let placement = label.with_order("button", args)?;
    let key = key("button", name);
    if let Some(pin) = pin {
        ctx.outputs.insert(key.clone(), pin);
    }
    ctx.store.write_default(key.clone(), state, Partition::Persisted);
    let current = ctx.store.read_int(&key).unwrap_or(state);
    drive_digital(ctx, &key, current != 0)?;
    placement.emit("toggle", key, ctx);
    Ok(())
}

/// `buttonSet <name> <state>`
fn button_set(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("buttonSet", args, "name")?;
    let state = required_state("buttonSet", args)?;
    let key = key("button", name);
    ctx.store.write_persisted(key.clone(), state);
    drive_digital(ctx, &key, state != 0)?;
    save_now(ctx)
}

/// `buttonChange <name>`
fn button_change(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("buttonChange", args, "name")?;
    let key = key("button", name);
    let state = i64::from(ctx.store.read_int(&key).unwrap_or(0) == 0);
    ctx.store.write_persisted(key.clone(), state);
    drive_digital(ctx, &key, state != 0)?;
    save_now(ctx)
}

/// `pinSet <pin> <level>`
fn pin_set(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let pin: u8 = required_number("pinSet", args, "pin")?;
    let level = required_state("pinSet", args)?;
    ctx.board.digital_write(pin, level != 0)?;
    ctx.store.write_live(key("pin", &pin.to_string()), level);
    Ok(())
}

/// `pinChange <pin>`
fn pin_change(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let pin: u8 = required_number("pinChange", args, "pin")?;
    let level = !ctx.board.digital_read(pin)?;
    ctx.board.digital_write(pin, level)?;
    ctx.store
        .write_live(key("pin", &pin.to_string()), i64::from(level));
    Ok(())
}

/// `pwm <name> <pin> <label> <page> <value> <order>`
fn pwm(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("pwm", args, "name")?;
    let pin: u8 = required_number("pwm", args, "pin")?;
    let label = WidgetLabel::read("pwm", args)?;
    let value = pwm_value("pwm", args)?;
    let placement = label.with_order("pwm", args)?;
    let key = key("pwm", name);
    ctx.outputs.insert(key.clone(), pin);
    ctx.store.write_default(key.clone(), value, Partition::Persisted);
    let current = ctx.store.read_int(&key).unwrap_or(value);
    drive_pwm(ctx, &key, current)?;
    placement.emit("range", key, ctx);
    Ok(())
}

/// `pwmSet <name> <value>`
fn pwm_set(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("pwmSet", args, "name")?;
    let value = pwm_value("pwmSet", args)?;
    let key = key("pwm", name);
    ctx.store.write_persisted(key.clone(), value);
    drive_pwm(ctx, &key, value)?;
    save_now(ctx)
}
