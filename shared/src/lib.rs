//! Mi Flora relay shared types
//!
//! This crate provides the reading types, report payloads, Mi Flora codec and
//! polling-job lifecycle shared by the relay and its tests.

pub mod codec;
pub mod state_machine;

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Default configuration values for the relay
pub mod defaults {
    /// Plant name reported to the backend
    pub const PLANT_NAME: &str = "Ananas";

    /// Polling interval in minutes
    pub const POLLING_INTERVAL_MINUTES: u64 = 10;

    /// How long to scan for peripherals in seconds
    pub const SCAN_DURATION_SECS: u64 = 10;

    /// Collection service base URL
    pub const BACKEND_URL: &str = "http://127.0.0.1:8080";

    /// Bluetooth adapter used for scanning and GATT reads
    pub const ADAPTER: &str = "hci0";

    /// How long one sensor refresh serves `read_field` calls, in seconds
    pub const CACHE_TIMEOUT_SECS: u64 = 60;
}

/// Process exit codes
pub mod exit_code {
    /// A precondition failed before any work started
    pub const PRECONDITION: i32 = 1;

    /// Interrupted by the operator
    pub const INTERRUPTED: i32 = 130;

    /// Any other fault, including radio and HTTP transport faults
    pub const FATAL: i32 = -1;
}

/// Error returned when parsing a textual Bluetooth address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid peripheral address: '{0}'")]
pub struct AddressParseError(pub String);

/// 48-bit Bluetooth hardware address of one peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralAddress([u8; 6]);

impl PeripheralAddress {
    /// Create an address from its six octets, most significant first
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// The six octets, most significant first
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Check whether the address starts with the given octets
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for PeripheralAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressParseError(s.to_string());

        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(octets))
    }
}

/// Telemetry fields a peripheral session can read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorField {
    Temperature,
    Moisture,
    Light,
    Conductivity,
    Battery,
}

impl SensorField {
    /// Every field read on a polling tick
    pub const ALL: [SensorField; 5] = [
        SensorField::Temperature,
        SensorField::Moisture,
        SensorField::Light,
        SensorField::Conductivity,
        SensorField::Battery,
    ];
}

impl fmt::Display for SensorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorField::Temperature => write!(f, "temperature"),
            SensorField::Moisture => write!(f, "moisture"),
            SensorField::Light => write!(f, "light"),
            SensorField::Conductivity => write!(f, "conductivity"),
            SensorField::Battery => write!(f, "battery"),
        }
    }
}

/// One set of telemetry values taken on a polling tick
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Temperature in °C
    pub temperature: f64,
    /// Soil moisture in percent
    pub moisture: u32,
    /// Illuminance in lux
    pub light: u32,
    /// Soil conductivity in µS/cm
    pub conductivity: u32,
    /// Battery level in percent
    pub battery: u32,
    /// When the reading was taken, in milliseconds since Unix epoch
    pub timestamp_ms: u64,
}

/// JSON body of `POST {base}/sensor/{address}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingReport<'a> {
    #[serde(rename = "dateAndTime")]
    pub date_and_time: u64,
    pub light: u32,
    pub temperature: f64,
    pub moisture: u32,
    pub conductivity: u32,
    pub battery: u32,
    pub name: &'a str,
}

impl<'a> ReadingReport<'a> {
    /// Build the report body for a reading taken on the named plant
    pub fn new(name: &'a str, reading: &SensorReading) -> Self {
        Self {
            date_and_time: reading.timestamp_ms,
            light: reading.light,
            temperature: reading.temperature,
            moisture: reading.moisture,
            conductivity: reading.conductivity,
            battery: reading.battery,
            name,
        }
    }
}

/// JSON body of `POST {base}/plant`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantRegistration<'a> {
    pub name: &'a str,
    pub data: Vec<serde_json::Value>,
}

impl<'a> PlantRegistration<'a> {
    /// Registration of a plant without any historical data
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            data: Vec::new(),
        }
    }
}
