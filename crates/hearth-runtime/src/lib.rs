//! `hearth-runtime` - command interpreter and state store for a home-automation controller.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Board pin access.
pub mod board;
/// Command table and dispatch.
pub mod command;
/// Controller configuration.
pub mod config;
/// Console output and TCP line console.
pub mod console;
/// Command line tokenizer.
pub mod cursor;
/// Runtime errors.
pub mod error;
/// Built-in command handlers.
pub mod handlers;
/// Messaging channel (status and order publishing).
pub mod messaging;
/// Persisted partition storage.
pub mod persist;
/// Pending command queue.
pub mod queue;
/// Runtime context and control loop step.
pub mod runtime;
/// Clocks, timers and period parsing.
pub mod scheduler;
/// Sensor bindings.
pub mod sensors;
/// Runtime state store and observers.
pub mod store;
/// State values and partitions.
pub mod value;
/// UI widget registry.
pub mod widgets;

pub use command::{CommandTable, DispatchOutcome};
pub use error::RuntimeError;
pub use runtime::{Runtime, RuntimeBuilder, RuntimeContext};
pub use store::StateStore;
pub use value::{Partition, StateValue};
