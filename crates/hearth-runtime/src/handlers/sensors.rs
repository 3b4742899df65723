//! Sensor declarations.
//!
//! Pin, model and level arguments are validated and recorded on the binding
//! but never written to the persisted partition.

use smol_str::SmolStr;

use crate::command::CommandTable;
use crate::cursor::{human_text, TokenCursor};
use crate::error::RuntimeError;
use crate::runtime::RuntimeContext;
use crate::sensors::{Layout, SensorBinding, SensorKind};
use crate::widgets::{WidgetDescriptor, WidgetSink};

use super::{required, required_number};

/// Derived comfort values computed from a DHT reading.
const DERIVED_KEYS: [&str; 3] = ["dhtPerception", "dhtComfort", "dhtDewpoint"];

pub(super) fn register(table: &mut CommandTable) {
    for kind in SensorKind::ALL {
        table.register(kind.command(), move |ctx, args| declare(kind, ctx, args));
    }
    for key in DERIVED_KEYS {
        table.register(key, move |ctx, args| derived(key, ctx, args));
    }
    table.register("oneWire", one_wire);
}

fn declare(
    kind: SensorKind,
    ctx: &mut RuntimeContext,
    args: &mut TokenCursor<'_>,
) -> Result<(), RuntimeError> {
    let command = kind.command();
    let key = required(command, args, "key")?;
    let mut binding = SensorBinding::new(kind, key);
    match kind.layout() {
        Layout::Pin => {
            binding.pins.push(required_number(command, args, "pin")?);
        }
        Layout::Address => {
            binding.address = Some(SmolStr::new(required(command, args, "address")?));
        }
        Layout::PinModel => {
            binding.pins.push(required_number(command, args, "pin")?);
            binding
                .params
                .push(SmolStr::new(required(command, args, "model")?));
        }
        Layout::Ranging => {
            binding.pins.push(required_number(command, args, "trig")?);
            binding.pins.push(required_number(command, args, "echo")?);
        }
    }
    let label = human_text(required(command, args, "label")?);
    let page = human_text(required(command, args, "page")?);
    let widget = required(command, args, "widget")?;
    if kind.layout() == Layout::Ranging {
        let empty: u32 = required_number(command, args, "empty")?;
        let full: u32 = required_number(command, args, "full")?;
        binding.params.push(SmolStr::new(empty.to_string()));
        binding.params.push(SmolStr::new(full.to_string()));
    }
    let order = required_number(command, args, "order")?;
    ctx.sensors.register(binding)?;
    ctx.widgets
        .emit(WidgetDescriptor::new(widget, key, label, page, order));
    Ok(())
}

/// `<derived> <label> <page> <order>`
fn derived(
    key: &'static str,
    ctx: &mut RuntimeContext,
    args: &mut TokenCursor<'_>,
) -> Result<(), RuntimeError> {
    let label = human_text(required(key, args, "label")?);
    let page = human_text(required(key, args, "page")?);
    let order = required_number(key, args, "order")?;
    ctx.widgets
        .emit(WidgetDescriptor::new("anydata", key, label, page, order));
    Ok(())
}

/// `oneWire <pin>`
fn one_wire(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let pin = required_number("oneWire", args, "pin")?;
    ctx.sensors.attach_one_wire(pin);
    Ok(())
}
