//! Messaging channel interface.

#![allow(missing_docs)]

use std::sync::Arc;

use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::error::RuntimeError;
use crate::store::{StateChange, StateObserver};

mod mqtt;
pub use mqtt::{MqttMessenger, MqttSettings};

/// Outbound side of the messaging channel.
pub trait Messenger: Send + Sync {
    /// Publishes the current value of a state key.
    fn publish_status(&self, key: &str, value: &str) -> Result<(), RuntimeError>;

    /// Publishes an operator order on a named topic.
    fn publish_order(&self, topic: &str, payload: &str) -> Result<(), RuntimeError>;
}

/// Messenger that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMessenger;

impl Messenger for NullMessenger {
    fn publish_status(&self, _key: &str, _value: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn publish_order(&self, _topic: &str, _payload: &str) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Message captured by a [`RecordingMessenger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Published {
    Status { key: SmolStr, value: SmolStr },
    Order { topic: SmolStr, payload: SmolStr },
}

/// Messenger that keeps every publish in memory; used by simulation and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingMessenger {
    messages: Arc<Mutex<Vec<Published>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingMessenger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Published> {
        self.messages.lock().clone()
    }

    /// Status values published for `key`, oldest first.
    #[must_use]
    pub fn statuses(&self, key: &str) -> Vec<SmolStr> {
        self.messages
            .lock()
            .iter()
            .filter_map(|message| match message {
                Published::Status { key: k, value } if k == key => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Makes every publish fail, as a disconnected client would.
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    fn record(&self, message: Published) -> Result<(), RuntimeError> {
        if *self.fail.lock() {
            return Err(RuntimeError::Messaging("not connected".into()));
        }
        self.messages.lock().push(message);
        Ok(())
    }
}

impl Messenger for RecordingMessenger {
    fn publish_status(&self, key: &str, value: &str) -> Result<(), RuntimeError> {
        self.record(Published::Status {
            key: key.into(),
            value: value.into(),
        })
    }

    fn publish_order(&self, topic: &str, payload: &str) -> Result<(), RuntimeError> {
        self.record(Published::Order {
            topic: topic.into(),
            payload: payload.into(),
        })
    }
}

/// Store observer that republishes each change as a status message.
pub struct StatusPublisher {
    messenger: Arc<dyn Messenger>,
}

impl std::fmt::Debug for StatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPublisher").finish_non_exhaustive()
    }
}

impl StatusPublisher {
    #[must_use]
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self { messenger }
    }
}

impl StateObserver for StatusPublisher {
    fn on_change(&mut self, change: &StateChange<'_>) -> Result<(), RuntimeError> {
        self.messenger
            .publish_status(change.key, &change.value.to_string())
    }
}
