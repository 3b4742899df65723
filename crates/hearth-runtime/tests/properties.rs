use std::cell::RefCell;
use std::rc::Rc;

use hearth_runtime::persist::{MemoryRegion, PersistenceAdapter};
use hearth_runtime::queue::CommandQueue;
use hearth_runtime::store::{KeyFilter, StateStore};
use hearth_runtime::{DispatchOutcome, Partition, Runtime, RuntimeError, StateValue};

#[test]
fn write_then_read_keeps_kind_and_value() {
    let mut store = StateStore::new();
    let cases = [
        ("count", StateValue::Int(-7)),
        ("ratio", StateValue::Float(20.0)),
        ("name", StateValue::from("porch light")),
    ];
    for (key, value) in &cases {
        store.write(*key, value.clone(), Partition::Persisted);
        let read = store.read(key).expect("value present");
        assert_eq!(read, value);
        assert_eq!(read.kind(), value.kind());
    }
    assert_eq!(store.read("absent"), None);
}

#[test]
fn unregistered_command_touches_nothing() {
    let mut runtime = Runtime::default();
    runtime.push("later 1");
    let snapshot = runtime.store().snapshot_document();
    let events = runtime.store().events().fired();
    let outcome = runtime.dispatch("frobnicate alpha 1");
    assert_eq!(
        outcome,
        DispatchOutcome::Unknown {
            command: "frobnicate".into()
        }
    );
    assert_eq!(runtime.store().snapshot_document(), snapshot);
    assert_eq!(runtime.store().events().fired(), events);
    assert_eq!(runtime.queue().len(), 1);
}

#[test]
fn reregistering_runs_only_second_handler() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut runtime = Runtime::default();
    let first = calls.clone();
    runtime.register("foo", move |_ctx, _args| {
        first.borrow_mut().push("first");
        Ok(())
    });
    let second = calls.clone();
    runtime.register("foo", move |_ctx, _args| {
        second.borrow_mut().push("second");
        Ok(())
    });
    runtime.dispatch("foo");
    assert_eq!(*calls.borrow(), vec!["second"]);
}

#[test]
fn save_then_load_reproduces_persisted_partition() {
    let region = MemoryRegion::new();
    let mut runtime = Runtime::builder()
        .with_storage(PersistenceAdapter::memory(region.clone()))
        .build();
    runtime.store_mut().write_persisted("switchalpha", 1);
    runtime.store_mut().write_persisted("pwmdim", 0.75);
    runtime.store_mut().write_persisted("time1", "06:45");
    runtime.store_mut().write_live("temp1", 19.5);
    runtime.save().expect("save");

    let mut fresh = Runtime::builder()
        .with_storage(PersistenceAdapter::memory(region))
        .build();
    assert_eq!(fresh.boot(), 3);
    let original: Vec<_> = runtime.store().persisted().collect();
    let restored: Vec<_> = fresh.store().persisted().collect();
    assert_eq!(original, restored);
    assert!(!fresh.store().contains("temp1"));
}

#[test]
fn script_expansion_matches_example() {
    let queue = CommandQueue::new();
    let added = queue.add_commands("// comment\nswitch alpha 1\n\nswitch beta 0\n");
    assert_eq!(added, 2);
    let lines: Vec<String> = std::iter::from_fn(|| queue.pop())
        .map(|line| line.to_string())
        .collect();
    assert_eq!(lines, vec!["switch alpha 1", "switch beta 0"]);
}

#[test]
fn two_writes_two_notifications() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let mut store = StateStore::new();
    store.subscribe_fn(KeyFilter::exact("temp1"), move |change| {
        sink.borrow_mut().push(change.value.clone());
        Ok(())
    });
    store.write_live("temp1", 20.0);
    store.write_live("temp1", 21.5);
    store.write_live("temp2", 5.0);
    assert_eq!(
        *seen.borrow(),
        vec![StateValue::Float(20.0), StateValue::Float(21.5)]
    );
}

#[test]
fn load_from_missing_or_empty_region_leaves_partition() {
    for region in [MemoryRegion::new(), MemoryRegion::with_contents("")] {
        let adapter = PersistenceAdapter::memory(region);
        let mut store = StateStore::new();
        store.write_persisted("digit1", 4);
        let err = adapter.load(&mut store).expect_err("nothing to load");
        assert!(matches!(err, RuntimeError::MissingDocument(_)));
        assert_eq!(store.persisted().count(), 1);
        assert_eq!(store.read_int("digit1"), Some(4));
    }
}
