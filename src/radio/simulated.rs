//! Simulated radio backend for development without Bluetooth hardware

use crate::radio::discovery::XIAOMI_PREFIX;
use crate::radio::traits::{PeripheralSession, RadioBackend, RadioError};
use async_trait::async_trait;
use miflora_shared::codec::{self, SensorData};
use miflora_shared::{PeripheralAddress, SensorField};
use std::time::Duration;
use tracing::info;

/// Firmware version reported by simulated peripherals
pub const SIMULATED_FIRMWARE: &str = "3.3.5";

/// Configuration for the simulated backend
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of peripherals the scan finds
    pub peripherals: u8,
    /// Fail every session after this many field reads
    pub fail_after_reads: Option<u32>,
    /// Whether the probe reports the backend as available
    pub available: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            peripherals: 1,
            fail_after_reads: None,
            available: true,
        }
    }
}

/// In-process radio with fixed Mi Flora peripherals
pub struct SimulatedBackend {
    config: SimulationConfig,
}

impl SimulatedBackend {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Address of the n-th simulated peripheral, starting at 1
    pub fn address(n: u8) -> PeripheralAddress {
        let [a, b, c] = XIAOMI_PREFIX;
        PeripheralAddress::new([a, b, c, 0x00, 0x00, n])
    }
}

#[async_trait]
impl RadioBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn is_available(&self) -> bool {
        self.config.available
    }

    async fn discover(&self, _scan_duration: Duration) -> Result<Vec<PeripheralAddress>, RadioError> {
        info!(
            "[BT] Simulated scan found {} peripheral(s)",
            self.config.peripherals
        );
        Ok((1..=self.config.peripherals).map(Self::address).collect())
    }

    async fn open_session(
        &self,
        address: PeripheralAddress,
    ) -> Result<Box<dyn PeripheralSession>, RadioError> {
        Ok(Box::new(SimulatedSession::new(
            address,
            self.config.fail_after_reads,
        )))
    }
}

/// Session returning a fixed plant reading
pub struct SimulatedSession {
    address: PeripheralAddress,
    reads: u32,
    fail_after_reads: Option<u32>,
}

impl SimulatedSession {
    pub fn new(address: PeripheralAddress, fail_after_reads: Option<u32>) -> Self {
        Self {
            address,
            reads: 0,
            fail_after_reads,
        }
    }

    /// The data frame a healthy peripheral would return
    fn data_frame() -> [u8; codec::DATA_FRAME_LEN] {
        codec::encode_sensor_data(&SensorData {
            temperature: 21.5,
            light: 1200,
            moisture: 30,
            conductivity: 350,
        })
    }

    /// The firmware frame a healthy peripheral would return
    fn firmware_frame() -> Vec<u8> {
        let mut frame = vec![80, 0x13];
        frame.extend_from_slice(SIMULATED_FIRMWARE.as_bytes());
        frame
    }

    fn count_read(&mut self) -> Result<(), RadioError> {
        if let Some(limit) = self.fail_after_reads {
            if self.reads >= limit {
                return Err(RadioError::Simulated {
                    address: self.address,
                    message: "connection to peripheral lost".into(),
                });
            }
        }
        self.reads += 1;
        Ok(())
    }
}

#[async_trait]
impl PeripheralSession for SimulatedSession {
    fn address(&self) -> PeripheralAddress {
        self.address
    }

    async fn firmware_version(&mut self) -> Result<String, RadioError> {
        Ok(codec::parse_firmware(&Self::firmware_frame())?.version)
    }

    async fn battery_level(&mut self) -> Result<u8, RadioError> {
        Ok(codec::parse_firmware(&Self::firmware_frame())?.battery)
    }

    async fn read_field(&mut self, field: SensorField) -> Result<f64, RadioError> {
        self.count_read()?;

        let data = codec::parse_sensor_data(&Self::data_frame())?;
        let value = match field {
            SensorField::Temperature => data.temperature,
            SensorField::Moisture => f64::from(data.moisture),
            SensorField::Light => f64::from(data.light),
            SensorField::Conductivity => f64::from(data.conductivity),
            SensorField::Battery => f64::from(self.battery_level().await?),
        };
        Ok(value)
    }
}
