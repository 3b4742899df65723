//! Sensor bindings declared by configuration commands.
//!
//! Drivers are external: the registry only records which reading key a
//! sensor feeds and how it is wired. Readings arrive through
//! `Runtime::report_reading` into the live partition.

#![allow(missing_docs)]

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::error::RuntimeError;

/// Argument shape of a sensor declaration, after the reading key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `<pin> <label> <page> <widget> <order>`
    Pin,
    /// `<address> <label> <page> <widget> <order>`
    Address,
    /// `<pin> <model> <label> <page> <widget> <order>`
    PinModel,
    /// `<trig> <echo> <label> <page> <widget> <empty> <full> <order>`
    Ranging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Analog,
    Dallas,
    DhtTemperature,
    DhtHumidity,
    Bmp280Temperature,
    Bmp280Pressure,
    Bme280Temperature,
    Bme280Pressure,
    Bme280Humidity,
    Bme280Altitude,
    LevelPercent,
    UltrasonicCm,
}

impl SensorKind {
    pub const ALL: [SensorKind; 12] = [
        Self::Analog,
        Self::Dallas,
        Self::DhtTemperature,
        Self::DhtHumidity,
        Self::Bmp280Temperature,
        Self::Bmp280Pressure,
        Self::Bme280Temperature,
        Self::Bme280Pressure,
        Self::Bme280Humidity,
        Self::Bme280Altitude,
        Self::LevelPercent,
        Self::UltrasonicCm,
    ];

    /// Command name that declares this sensor.
    #[must_use]
    pub fn command(self) -> &'static str {
        match self {
            Self::Analog => "analog",
            Self::Dallas => "dallas",
            Self::DhtTemperature => "dhtT",
            Self::DhtHumidity => "dhtH",
            Self::Bmp280Temperature => "bmp280T",
            Self::Bmp280Pressure => "bmp280P",
            Self::Bme280Temperature => "bme280T",
            Self::Bme280Pressure => "bme280P",
            Self::Bme280Humidity => "bme280H",
            Self::Bme280Altitude => "bme280A",
            Self::LevelPercent => "levelPr",
            Self::UltrasonicCm => "ultrasonicCm",
        }
    }

    #[must_use]
    pub fn from_command(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.command() == name)
    }

    #[must_use]
    pub fn layout(self) -> Layout {
        match self {
            Self::Analog => Layout::Pin,
            Self::DhtTemperature | Self::DhtHumidity => Layout::PinModel,
            Self::LevelPercent | Self::UltrasonicCm => Layout::Ranging,
            Self::Dallas
            | Self::Bmp280Temperature
            | Self::Bmp280Pressure
            | Self::Bme280Temperature
            | Self::Bme280Pressure
            | Self::Bme280Humidity
            | Self::Bme280Altitude => Layout::Address,
        }
    }

    /// Whether the sensor hangs off the one-wire bus.
    #[must_use]
    pub fn needs_one_wire(self) -> bool {
        matches!(self, Self::Dallas)
    }
}

/// Wiring of one declared sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorBinding {
    pub kind: SensorKind,
    /// Live state key the sensor's readings are written to.
    pub key: SmolStr,
    pub pins: Vec<u8>,
    pub address: Option<SmolStr>,
    /// Model and level parameters, kept for diagnostics only.
    pub params: Vec<SmolStr>,
}

impl SensorBinding {
    #[must_use]
    pub fn new(kind: SensorKind, key: impl Into<SmolStr>) -> Self {
        Self {
            kind,
            key: key.into(),
            pins: Vec::new(),
            address: None,
            params: Vec::new(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind.command(),
            "key": self.key.as_str(),
            "pins": self.pins,
            "address": self.address.as_deref(),
            "params": self.params.iter().map(SmolStr::as_str).collect::<Vec<_>>(),
        })
    }
}

/// Registered sensors keyed by reading key, in declaration order.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    bindings: IndexMap<SmolStr, SensorBinding>,
    one_wire: Option<u8>,
}

impl SensorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_one_wire(&mut self, pin: u8) {
        debug!(pin, "one-wire bus attached");
        self.one_wire = Some(pin);
    }

    #[must_use]
    pub fn one_wire(&self) -> Option<u8> {
        self.one_wire
    }

    /// Adds or replaces the binding for `binding.key`.
    pub fn register(&mut self, binding: SensorBinding) -> Result<(), RuntimeError> {
        if binding.kind.needs_one_wire() && self.one_wire.is_none() {
            return Err(RuntimeError::Device(
                format!("{}: attach one-wire bus first", binding.kind.command()).into(),
            ));
        }
        debug!(
            kind = binding.kind.command(),
            key = binding.key.as_str(),
            "sensor registered"
        );
        self.bindings.insert(binding.key.clone(), binding);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SensorBinding> {
        self.bindings.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorBinding> {
        self.bindings.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// JSON listing used by `get devices`.
    #[must_use]
    pub fn describe(&self) -> String {
        serde_json::Value::Array(self.bindings.values().map(SensorBinding::to_json).collect())
            .to_string()
    }
}
