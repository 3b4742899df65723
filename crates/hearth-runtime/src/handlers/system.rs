//! Timers, messaging, queries, transports and lifecycle commands.

use tracing::info;

use crate::command::CommandTable;
use crate::cursor::TokenCursor;
use crate::error::RuntimeError;
use crate::runtime::{RuntimeContext, FIRMWARE_KEY};
use crate::scheduler::{parse_period, ONE_SECOND_MS};

use super::{in_command, required, required_number, required_state, WidgetPlacement};

pub(super) fn register(table: &mut CommandTable) {
    table.register("timerStart", timer_start);
    table.register("timerStop", timer_stop);
    table.register("mqtt", mqtt);
    table.register("get", get);
    table.register("firmwareVersion", firmware_version);
    table.register("telnet", telnet);
    table.register("save", save);
    table.register("load", load);
    table.register("reboot", reboot);
}

/// `timerStart <name> <period>`
fn timer_start(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("timerStart", args, "name")?;
    let period = required("timerStart", args, "period")?;
    let period = parse_period(period, ONE_SECOND_MS, &ctx.store)
        .map_err(|err| in_command("timerStart", err))?;
    let now = ctx.now();
    ctx.timers.start(name, period, now, &mut ctx.store);
    Ok(())
}

/// `timerStop <name>`
fn timer_stop(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let name = required("timerStop", args, "name")?;
    ctx.timers.stop(name, &mut ctx.store);
    Ok(())
}

/// `mqtt <topic> <payload>`
fn mqtt(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let topic = required("mqtt", args, "topic")?;
    let payload = required("mqtt", args, "payload")?;
    ctx.messenger.publish_order(topic, payload)
}

/// `get state [key]` or `get devices`
fn get(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let object = required("get", args, "object")?;
    let text = if object.eq_ignore_ascii_case("state") {
        match args.next_opt() {
            Some(key) => ctx
                .store
                .read(key)
                .map(ToString::to_string)
                .unwrap_or_default(),
            None => ctx.store.snapshot_document(),
        }
    } else if object.eq_ignore_ascii_case("devices") {
        ctx.sensors.describe()
    } else {
        return Err(RuntimeError::invalid_argument(
            "get",
            object,
            "expected state or devices",
        ));
    };
    ctx.println(&text);
    Ok(())
}

/// `firmwareVersion <label> <page> <order>`
fn firmware_version(
    ctx: &mut RuntimeContext,
    args: &mut TokenCursor<'_>,
) -> Result<(), RuntimeError> {
    WidgetPlacement::read("firmwareVersion", args)?.emit("anydata", FIRMWARE_KEY, ctx);
    Ok(())
}

/// `telnet <0|1> <port>`
fn telnet(ctx: &mut RuntimeContext, args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let enabled = required_state("telnet", args)? != 0;
    if !enabled {
        if ctx.telnet.disable(&mut ctx.console) {
            ctx.println("telnet: disabled");
        }
        return Ok(());
    }
    let port: u16 = required_number("telnet", args, "port")?;
    let addr = ctx
        .telnet
        .enable(port, ctx.commands.clone(), &mut ctx.console)?;
    ctx.println(&format!("telnet: listening on {addr}"));
    Ok(())
}

fn save(ctx: &mut RuntimeContext, _args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let count = ctx.save()?;
    ctx.println(&format!("saved {count} entries"));
    Ok(())
}

fn load(ctx: &mut RuntimeContext, _args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    let count = ctx.load()?;
    ctx.println(&format!("loaded {count} entries"));
    Ok(())
}

fn reboot(ctx: &mut RuntimeContext, _args: &mut TokenCursor<'_>) -> Result<(), RuntimeError> {
    info!("reboot requested");
    ctx.reboot = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::command::DispatchOutcome;
    use crate::console::MemorySink;
    use crate::error::RuntimeError;
    use crate::messaging::{Published, RecordingMessenger};
    use crate::persist::{MemoryRegion, PersistenceAdapter};
    use crate::runtime::Runtime;
    use crate::scheduler::ManualClock;

    #[test]
    fn timer_counts_down_on_ticks() {
        let clock = ManualClock::new();
        let mut runtime = Runtime::builder().with_clock(Arc::new(clock.clone())).build();
        runtime.push("timerStart 1 3s");
        runtime.tick();
        assert_eq!(runtime.store().read_int("timer1"), Some(3));
        clock.advance(Duration::from_secs(2));
        runtime.tick();
        assert_eq!(runtime.store().read_int("timer1"), Some(1));
        clock.advance(Duration::from_secs(1));
        runtime.tick();
        assert_eq!(runtime.store().read_int("timer1"), Some(0));
    }

    #[test]
    fn timer_period_from_digit_key() {
        let clock = ManualClock::new();
        let mut runtime = Runtime::builder().with_clock(Arc::new(clock.clone())).build();
        runtime.dispatch("digitSet 2 90");
        runtime.dispatch("timerStart pump digit2");
        assert_eq!(runtime.store().read_int("timerpump"), Some(90));
        let outcome = runtime.dispatch("timerStart pump soon");
        assert!(matches!(
            outcome.error(),
            Some(RuntimeError::InvalidArgument { ref command, .. }) if command == "timerStart"
        ));
        runtime.dispatch("timerStop pump");
        assert_eq!(runtime.store().read_int("timerpump"), Some(0));
    }

    #[test]
    fn mqtt_publishes_order() {
        let messenger = RecordingMessenger::new();
        let mut runtime = Runtime::builder()
            .with_messenger(Arc::new(messenger.clone()))
            .build();
        runtime.dispatch("mqtt lamp on");
        assert!(messenger.messages().contains(&Published::Order {
            topic: "lamp".into(),
            payload: "on".into()
        }));
    }

    #[test]
    fn get_prints_state() {
        let sink = MemorySink::new();
        let mut runtime = Runtime::builder()
            .with_output("test", Box::new(sink.clone()))
            .build();
        runtime.store_mut().write_live("temp1", 21.5);
        runtime.dispatch("get state temp1");
        assert_eq!(sink.last().as_deref(), Some("21.5"));
        runtime.dispatch("get state missing");
        assert_eq!(sink.last().as_deref(), Some(""));
        runtime.dispatch("get devices");
        assert_eq!(sink.last().as_deref(), Some("[]"));
        assert!(matches!(
            runtime.dispatch("get things"),
            DispatchOutcome::Failed { .. }
        ));
    }

    #[test]
    fn save_load_and_reboot_commands() {
        let region = MemoryRegion::new();
        let mut runtime = Runtime::builder()
            .with_storage(PersistenceAdapter::memory(region.clone()))
            .build();
        assert!(matches!(
            runtime.dispatch("load").error(),
            Some(RuntimeError::MissingDocument(_))
        ));
        runtime.store_mut().write_persisted("digit1", 4);
        assert!(runtime.dispatch("save").is_executed());
        assert!(region.contents().is_some());
        assert!(runtime.dispatch("load").is_executed());
        assert!(!runtime.reboot_requested());
        runtime.dispatch("reboot");
        assert!(runtime.reboot_requested());
    }

    #[test]
    fn firmware_widget_is_bound_to_version_key() {
        let mut runtime = Runtime::default();
        runtime.dispatch("firmwareVersion Version System 9");
        assert!(runtime.context().widgets.get("firmware").is_some());
        assert_eq!(
            runtime.store().read_str("firmware"),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }
}
