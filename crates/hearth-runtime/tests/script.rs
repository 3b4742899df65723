use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hearth_runtime::board::SimulatedBoard;
use hearth_runtime::messaging::{Published, RecordingMessenger};
use hearth_runtime::persist::{PersistenceAdapter, WriteMode};
use hearth_runtime::scheduler::ManualClock;
use hearth_runtime::{DispatchOutcome, Runtime};

const BOOT_SCRIPT: &str = "\
// hall\r
button A 13 Hall#lamp Hall 0 1\r
pwm dim 12 Dimmer Hall 200 2\r
inputDigit digit1 Pump#minutes Garden 2 1\r
text status Status Hall 3\r
\r
// sensors\r
oneWire 4\r
dallas temp1 0x28 Water Garden anydata 2\r
dhtH hum 2 dht22 Humidity Garden anydata 3\r
firmwareVersion Version System 1";

fn temp_path(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let pid = std::process::id();
    path.push(format!("hearth_runtime_script_{pid}_{name}.json"));
    path
}

fn build(path: &PathBuf, board: &SimulatedBoard, messenger: &RecordingMessenger) -> Runtime {
    Runtime::builder()
        .with_storage(PersistenceAdapter::file(path, WriteMode::Atomic))
        .with_board(Box::new(board.clone()))
        .with_messenger(Arc::new(messenger.clone()))
        .build()
}

#[test]
fn boot_script_runs_one_line_per_tick() {
    let path = temp_path("ticks");
    let _ = std::fs::remove_file(&path);
    let board = SimulatedBoard::new();
    let messenger = RecordingMessenger::new();
    let mut runtime = build(&path, &board, &messenger);
    assert_eq!(runtime.boot(), 0);
    assert_eq!(runtime.add_commands(BOOT_SCRIPT), 9);

    let mut outcomes = Vec::new();
    while let Some(outcome) = runtime.tick() {
        outcomes.push(outcome);
    }
    assert_eq!(outcomes.len(), 9);
    assert!(
        outcomes.iter().all(DispatchOutcome::is_executed),
        "{outcomes:?}"
    );
    assert_eq!(runtime.context().widgets.len(), 7);
    assert_eq!(runtime.context().sensors.len(), 2);
    assert_eq!(board.duty(12), Some(200));
    assert_eq!(board.level(13), Some(false));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn operator_changes_survive_reboot() {
    let path = temp_path("reboot");
    let _ = std::fs::remove_file(&path);
    let board = SimulatedBoard::new();
    let messenger = RecordingMessenger::new();

    let mut runtime = build(&path, &board, &messenger);
    runtime.boot();
    runtime.add_commands(BOOT_SCRIPT);
    runtime.add_commands("buttonSet A 1\ndigitSet 1 15\npwmSet dim 900\nreboot\n");
    runtime.run_pending();
    assert!(runtime.reboot_requested());
    drop(runtime);

    let board = SimulatedBoard::new();
    let mut runtime = build(&path, &board, &messenger);
    assert_eq!(runtime.boot(), 3);
    runtime.add_commands(BOOT_SCRIPT);
    runtime.run_pending();
    assert_eq!(runtime.store().read_int("buttonA"), Some(1));
    assert_eq!(runtime.store().read_int("digit1"), Some(15));
    assert_eq!(runtime.store().read_int("pwmdim"), Some(900));
    assert_eq!(board.level(13), Some(true));
    assert_eq!(board.duty(12), Some(900));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn bad_lines_are_dropped_and_the_rest_runs() {
    let mut runtime = Runtime::default();
    runtime.add_commands("switch a 1\nbogus 1\nswitch b\nswitch c 0\n");
    let outcomes = runtime.run_pending();
    assert!(outcomes[0].is_executed());
    assert!(matches!(outcomes[1], DispatchOutcome::Unknown { .. }));
    assert!(matches!(outcomes[2], DispatchOutcome::Failed { .. }));
    assert!(outcomes[3].is_executed());
    assert_eq!(runtime.store().read_int("switcha"), Some(1));
    assert!(!runtime.store().contains("switchb"));
    assert_eq!(runtime.store().read_int("switchc"), Some(0));
}

#[test]
fn handlers_can_queue_follow_up_lines() {
    let mut runtime = Runtime::default();
    runtime.register("scene", |ctx, args| {
        let state = args.next();
        ctx.commands.add_commands(&format!("switch a {state}\nswitch b {state}"));
        Ok(())
    });
    runtime.push("scene 1");
    runtime.push("switch c 1");
    runtime.run_pending();
    let order = runtime.drain_events();
    let positions: Vec<_> = ["switchc", "switcha", "switchb"]
        .iter()
        .map(|key| order.iter().position(|k| k == key).expect("event"))
        .collect();
    assert!(positions[0] < positions[1] && positions[1] < positions[2]);
}

#[test]
fn status_published_for_readings_and_timers() {
    let clock = ManualClock::new();
    let messenger = RecordingMessenger::new();
    let mut runtime = Runtime::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_messenger(Arc::new(messenger.clone()))
        .build();
    runtime.report_reading("temp1", 20.0);
    runtime.report_reading("temp1", 21.5);
    assert_eq!(messenger.statuses("temp1"), vec!["20", "21.5"]);

    runtime.dispatch("timerStart 7 2");
    clock.advance(Duration::from_secs(2));
    runtime.tick();
    assert_eq!(messenger.statuses("timer7"), vec!["2", "0"]);
    assert!(messenger.messages().iter().all(|m| matches!(m, Published::Status { .. })));
}
