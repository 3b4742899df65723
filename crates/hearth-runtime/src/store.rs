//! Runtime state store with live and persisted partitions.

#![allow(missing_docs)]

use std::collections::{BTreeMap, VecDeque};

use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::value::{Partition, StateValue};

const CHANGE_LOG_LIMIT: usize = 200;

/// One applied write, as seen by observers.
#[derive(Debug, Clone, Copy)]
pub struct StateChange<'a> {
    pub key: &'a str,
    pub value: &'a StateValue,
    pub partition: Partition,
}

/// Receives a notification after every matching write.
///
/// Observers are fire-and-forget: an error is logged and the write stands.
pub trait StateObserver {
    fn on_change(&mut self, change: &StateChange<'_>) -> Result<(), RuntimeError>;
}

impl<F> StateObserver for F
where
    F: FnMut(&StateChange<'_>) -> Result<(), RuntimeError>,
{
    fn on_change(&mut self, change: &StateChange<'_>) -> Result<(), RuntimeError> {
        self(change)
    }
}

/// Selects the keys an observer is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    All,
    Exact(SmolStr),
    Prefix(SmolStr),
}

impl KeyFilter {
    #[must_use]
    pub fn exact(key: impl Into<SmolStr>) -> Self {
        Self::Exact(key.into())
    }

    #[must_use]
    pub fn prefix(prefix: impl Into<SmolStr>) -> Self {
        Self::Prefix(prefix.into())
    }

    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(expected) => expected == key,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct ObserverEntry {
    id: ObserverId,
    filter: KeyFilter,
    observer: Box<dyn StateObserver>,
}

/// Bounded record of changed keys, oldest first.
///
/// This is the change-event signal consumed by rule engines; it keeps the
/// last [`CHANGE_LOG_LIMIT`] keys.
#[derive(Debug, Default, Clone)]
pub struct ChangeLog {
    keys: VecDeque<SmolStr>,
    fired: u64,
}

impl ChangeLog {
    fn fire(&mut self, key: &SmolStr) {
        self.keys.push_back(key.clone());
        while self.keys.len() > CHANGE_LOG_LIMIT {
            self.keys.pop_front();
        }
        self.fired += 1;
    }

    /// Total number of events fired since start-up.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn iter(&self) -> impl Iterator<Item = &SmolStr> {
        self.keys.iter()
    }

    pub fn drain(&mut self) -> Vec<SmolStr> {
        self.keys.drain(..).collect()
    }
}

/// Key/value registry split into live and persisted partitions.
///
/// A key's partition is decided by its first write and never changes; later
/// writes requesting the other partition land in the original one.
#[derive(Default)]
pub struct StateStore {
    live: BTreeMap<SmolStr, StateValue>,
    persisted: BTreeMap<SmolStr, StateValue>,
    observers: Vec<ObserverEntry>,
    next_observer: u64,
    events: ChangeLog,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("live", &self.live.len())
            .field("persisted", &self.persisted.len())
            .field("observers", &self.observers.len())
            .field("events_fired", &self.events.fired)
            .finish()
    }
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key` and notifies observers bound to the key.
    ///
    /// Returns the partition that now holds the key.
    pub fn write(
        &mut self,
        key: impl Into<SmolStr>,
        value: impl Into<StateValue>,
        partition: Partition,
    ) -> Partition {
        let key = key.into();
        let value = value.into();
        let target = self.partition_of(&key).unwrap_or(partition);
        if target != partition {
            debug!(
                key = key.as_str(),
                requested = partition.as_str(),
                held = target.as_str(),
                "key keeps its first partition"
            );
        }
        self.partition_mut(target).insert(key.clone(), value.clone());
        self.notify(&key, &value, target);
        target
    }

    pub fn write_live(&mut self, key: impl Into<SmolStr>, value: impl Into<StateValue>) {
        self.write(key, value, Partition::Live);
    }

    pub fn write_persisted(&mut self, key: impl Into<SmolStr>, value: impl Into<StateValue>) {
        self.write(key, value, Partition::Persisted);
    }

    /// Writes only when the key has no value yet; returns whether it wrote.
    ///
    /// Declarations re-run on every boot use this so loaded configuration is
    /// not clobbered by script defaults.
    pub fn write_default(
        &mut self,
        key: impl Into<SmolStr>,
        value: impl Into<StateValue>,
        partition: Partition,
    ) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }
        self.write(key, value, partition);
        true
    }

    #[must_use]
    pub fn read(&self, key: &str) -> Option<&StateValue> {
        self.persisted.get(key).or_else(|| self.live.get(key))
    }

    #[must_use]
    pub fn read_int(&self, key: &str) -> Option<i64> {
        self.read(key).and_then(StateValue::as_int)
    }

    #[must_use]
    pub fn read_float(&self, key: &str) -> Option<f64> {
        self.read(key).and_then(StateValue::as_float)
    }

    #[must_use]
    pub fn read_str(&self, key: &str) -> Option<&str> {
        self.read(key).and_then(StateValue::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.partition_of(key).is_some()
    }

    #[must_use]
    pub fn partition_of(&self, key: &str) -> Option<Partition> {
        if self.persisted.contains_key(key) {
            Some(Partition::Persisted)
        } else if self.live.contains_key(key) {
            Some(Partition::Live)
        } else {
            None
        }
    }

    /// Persisted entries in key order.
    pub fn persisted(&self) -> impl Iterator<Item = (&SmolStr, &StateValue)> {
        self.persisted.iter()
    }

    /// Live entries in key order.
    pub fn live(&self) -> impl Iterator<Item = (&SmolStr, &StateValue)> {
        self.live.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len() + self.persisted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty() && self.persisted.is_empty()
    }

    /// Both partitions merged into one JSON object ordered by key.
    ///
    /// Non-finite floats are omitted since JSON cannot carry them.
    #[must_use]
    pub fn snapshot_document(&self) -> String {
        let merged = self
            .live
            .iter()
            .chain(self.persisted.iter())
            .filter_map(|(key, value)| value.to_json().map(|json| (key.as_str(), json)))
            .collect::<BTreeMap<_, _>>();
        serde_json::to_string(&merged).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn subscribe(
        &mut self,
        filter: KeyFilter,
        observer: impl StateObserver + 'static,
    ) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push(ObserverEntry {
            id,
            filter,
            observer: Box::new(observer),
        });
        id
    }

    /// Closure form of [`StateStore::subscribe`].
    pub fn subscribe_fn<F>(&mut self, filter: KeyFilter, observer: F) -> ObserverId
    where
        F: FnMut(&StateChange<'_>) -> Result<(), RuntimeError> + 'static,
    {
        self.subscribe(filter, observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|entry| entry.id != id);
        before != self.observers.len()
    }

    #[must_use]
    pub fn events(&self) -> &ChangeLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut ChangeLog {
        &mut self.events
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut BTreeMap<SmolStr, StateValue> {
        match partition {
            Partition::Live => &mut self.live,
            Partition::Persisted => &mut self.persisted,
        }
    }

    fn notify(&mut self, key: &SmolStr, value: &StateValue, partition: Partition) {
        self.events.fire(key);
        let change = StateChange {
            key: key.as_str(),
            value,
            partition,
        };
        for entry in &mut self.observers {
            if !entry.filter.matches(key) {
                continue;
            }
            if let Err(err) = entry.observer.on_change(&change) {
                warn!(key = key.as_str(), %err, "state observer failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn write_then_read_keeps_kind() {
        let mut store = StateStore::new();
        store.write("digit1", 5, Partition::Persisted);
        store.write("temp1", 20.0, Partition::Live);
        store.write("time1", "07:30", Partition::Persisted);
        assert_eq!(store.read("digit1"), Some(&StateValue::Int(5)));
        assert_eq!(store.read("temp1").map(StateValue::kind), Some(ValueKind::Float));
        assert_eq!(store.read_str("time1"), Some("07:30"));
        assert_eq!(store.read("missing"), None);
    }

    #[test]
    fn overwrite_replaces_kind() {
        let mut store = StateStore::new();
        store.write_live("x", 1);
        store.write_live("x", "one");
        assert_eq!(store.read("x"), Some(&StateValue::from("one")));
        assert_eq!(store.read_int("x"), None);
    }

    #[test]
    fn partition_is_fixed_by_first_write() {
        let mut store = StateStore::new();
        store.write("switchA", 1, Partition::Persisted);
        let held = store.write("switchA", 0, Partition::Live);
        assert_eq!(held, Partition::Persisted);
        assert_eq!(store.partition_of("switchA"), Some(Partition::Persisted));
        assert_eq!(store.live().count(), 0);
        assert_eq!(store.read_int("switchA"), Some(0));
    }

    #[test]
    fn write_default_does_not_clobber() {
        let mut store = StateStore::new();
        assert!(store.write_default("digit1", 10, Partition::Persisted));
        store.write_persisted("digit1", 42);
        assert!(!store.write_default("digit1", 10, Partition::Persisted));
        assert_eq!(store.read_int("digit1"), Some(42));
    }

    #[test]
    fn observers_fire_once_per_write_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = StateStore::new();
        let sink = seen.clone();
        store.subscribe_fn(KeyFilter::exact("temp1"), move |change| {
            sink.borrow_mut().push(change.value.clone());
            Ok(())
        });
        store.write_live("temp1", 20.0);
        store.write_live("temp2", 5.0);
        store.write_live("temp1", 21.5);
        assert_eq!(
            *seen.borrow(),
            vec![StateValue::Float(20.0), StateValue::Float(21.5)]
        );
    }

    #[test]
    fn failing_observer_does_not_abort_write() {
        let mut store = StateStore::new();
        store.subscribe_fn(KeyFilter::All, |_| {
            Err(RuntimeError::Observer("offline".into()))
        });
        let count = Rc::new(RefCell::new(0));
        let counter = count.clone();
        store.subscribe_fn(KeyFilter::prefix("switch"), move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });
        store.write_persisted("switchA", 1);
        assert_eq!(store.read_int("switchA"), Some(1));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let count = Rc::new(RefCell::new(0));
        let counter = count.clone();
        let mut store = StateStore::new();
        let id = store.subscribe_fn(KeyFilter::All, move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });
        store.write_live("a", 1);
        assert!(store.unsubscribe(id));
        store.write_live("a", 2);
        assert_eq!(*count.borrow(), 1);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn change_log_is_bounded() {
        let mut store = StateStore::new();
        for idx in 0..(CHANGE_LOG_LIMIT + 10) {
            store.write_live(format!("k{idx}"), 1);
        }
        assert_eq!(store.events().iter().count(), CHANGE_LOG_LIMIT);
        assert_eq!(store.events().fired(), (CHANGE_LOG_LIMIT + 10) as u64);
        let drained = store.events_mut().drain();
        assert_eq!(drained.first().map(SmolStr::as_str), Some("k10"));
        assert_eq!(store.events().iter().count(), 0);
    }

    #[test]
    fn snapshot_merges_partitions_in_key_order() {
        let mut store = StateStore::new();
        store.write_live("temp1", 21.5);
        store.write_persisted("digit1", 3);
        store.write_persisted("alpha", "x");
        assert_eq!(
            store.snapshot_document(),
            r#"{"alpha":"x","digit1":3,"temp1":21.5}"#
        );
    }
}
