//! Radio trait abstraction for pluggable Bluetooth backends

use async_trait::async_trait;
use miflora_shared::codec::CodecError;
use miflora_shared::{PeripheralAddress, SensorField};
use std::time::Duration;
use thiserror::Error;

/// Faults raised by a radio backend or a peripheral session
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("BlueZ error: {0}")]
    Bluez(#[from] bluer::Error),

    #[error("Malformed sensor payload: {0}")]
    Codec(#[from] CodecError),

    #[error("Characteristic {uuid} not found on {address}")]
    CharacteristicNotFound {
        address: PeripheralAddress,
        uuid: bluer::Uuid,
    },

    #[error("Services of {0} were not resolved after connecting")]
    ServicesUnresolved(PeripheralAddress),

    #[error("Adapter '{0}' not found")]
    AdapterNotFound(String),

    #[error("Simulated fault on {address}: {message}")]
    Simulated {
        address: PeripheralAddress,
        message: String,
    },
}

/// A stateful handle bound to one peripheral
#[async_trait]
pub trait PeripheralSession: Send {
    /// Address this session is bound to
    fn address(&self) -> PeripheralAddress;

    /// Firmware version reported by the peripheral
    async fn firmware_version(&mut self) -> Result<String, RadioError>;

    /// Battery level in percent
    async fn battery_level(&mut self) -> Result<u8, RadioError>;

    /// Start a polling tick; nothing read before it is reused
    fn begin_tick(&mut self) {}

    /// Read one telemetry field
    async fn read_field(&mut self, field: SensorField) -> Result<f64, RadioError>;
}

/// Factory for discovering peripherals and opening sessions to them
#[async_trait]
pub trait RadioBackend: Send + Sync {
    /// Human-readable name for this backend
    fn name(&self) -> &'static str;

    /// Check that the backend can be used on this host
    async fn is_available(&self) -> bool;

    /// Scan for sensor peripherals for up to `scan_duration`
    async fn discover(&self, scan_duration: Duration) -> Result<Vec<PeripheralAddress>, RadioError>;

    /// Open a session bound to one discovered peripheral
    async fn open_session(
        &self,
        address: PeripheralAddress,
    ) -> Result<Box<dyn PeripheralSession>, RadioError>;
}
