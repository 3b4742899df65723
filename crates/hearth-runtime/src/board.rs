//! Board pin access.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::RuntimeError;

/// Highest duty value accepted by [`Board::pwm_write`].
pub const PWM_MAX: u16 = 1023;

/// Digital and PWM output interface of the controller board.
pub trait Board: Send {
    fn digital_write(&mut self, pin: u8, high: bool) -> Result<(), RuntimeError>;

    fn digital_read(&mut self, pin: u8) -> Result<bool, RuntimeError>;

    fn pwm_write(&mut self, pin: u8, duty: u16) -> Result<(), RuntimeError>;
}

#[derive(Debug, Default)]
struct PinImage {
    digital: BTreeMap<u8, bool>,
    pwm: BTreeMap<u8, u16>,
}

/// Board that remembers the last output per pin and reads it back.
///
/// Clones share the pin image so tests can inspect what handlers drove.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    image: Arc<Mutex<PinImage>>,
}

impl SimulatedBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.image.lock().digital.get(&pin).copied()
    }

    #[must_use]
    pub fn duty(&self, pin: u8) -> Option<u16> {
        self.image.lock().pwm.get(&pin).copied()
    }
}

impl Board for SimulatedBoard {
    fn digital_write(&mut self, pin: u8, high: bool) -> Result<(), RuntimeError> {
        trace!(pin, high, "digital write");
        self.image.lock().digital.insert(pin, high);
        Ok(())
    }

    fn digital_read(&mut self, pin: u8) -> Result<bool, RuntimeError> {
        Ok(self.image.lock().digital.get(&pin).copied().unwrap_or(false))
    }

    fn pwm_write(&mut self, pin: u8, duty: u16) -> Result<(), RuntimeError> {
        if duty > PWM_MAX {
            return Err(RuntimeError::Device(
                format!("pwm duty {duty} above {PWM_MAX} on pin {pin}").into(),
            ));
        }
        trace!(pin, duty, "pwm write");
        self.image.lock().pwm.insert(pin, duty);
        Ok(())
    }
}
