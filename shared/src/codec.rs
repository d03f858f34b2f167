//! Mi Flora GATT payload codec
//!
//! The sensor exposes two readable characteristics:
//! ```text
//! data     [ i16 LE temp/10 ][ u8 - ][ u32 LE light ][ u8 moisture ][ u16 LE conductivity ][ 6 bytes - ]
//! firmware [ u8 battery ][ u8 - ][ ASCII version ... ]
//! ```
//!
//! Firmware 2.6.6 and newer only refresh the data characteristic after
//! [`MODE_CHANGE_CMD`] has been written to the mode characteristic.

use bytes::Buf;
use std::fmt;
use thiserror::Error;

/// Length of the data characteristic payload
pub const DATA_FRAME_LEN: usize = 16;

/// Minimum length of the firmware characteristic payload
pub const FIRMWARE_FRAME_MIN_LEN: usize = 3;

/// Bytes written to the mode characteristic to enable live readings
pub const MODE_CHANGE_CMD: [u8; 2] = [0xA0, 0x1F];

/// First firmware version that needs [`MODE_CHANGE_CMD`]
pub const MODE_CHANGE_MIN_FIRMWARE: [u32; 3] = [2, 6, 6];

/// Frame the sensor returns while it has no valid measurement
pub const INVALID_DATA_FRAME: [u8; DATA_FRAME_LEN] = [
    0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x99, 0x88, 0x77, 0x66, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// Errors that can occur while decoding sensor payloads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Not enough data: need {needed} bytes, have {available}")]
    NotEnoughData { needed: usize, available: usize },

    #[error("Sensor returned no valid measurement")]
    InvalidMeasurement,

    #[error("Moisture out of range: {0}%")]
    MoistureOutOfRange(u8),

    #[error("Firmware version is not ASCII: {0:02X?}")]
    InvalidFirmwareVersion(Vec<u8>),
}

/// Decoded contents of the data characteristic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorData {
    /// Temperature in °C, one decimal
    pub temperature: f64,
    /// Illuminance in lux
    pub light: u32,
    /// Soil moisture in percent
    pub moisture: u8,
    /// Soil conductivity in µS/cm
    pub conductivity: u16,
}

/// Decoded contents of the firmware characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// Battery level in percent
    pub battery: u8,
    /// Firmware version string, e.g. `3.2.1`
    pub version: String,
}

impl FirmwareInfo {
    /// Numeric components of the version, ignoring any non-numeric suffix
    pub fn version_components(&self) -> Vec<u32> {
        self.version
            .split('.')
            .map(|part| {
                part.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Whether live readings need the mode-change command first
    pub fn requires_mode_change(&self) -> bool {
        self.version_components().as_slice() >= MODE_CHANGE_MIN_FIRMWARE.as_slice()
    }
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (battery {}%)", self.version, self.battery)
    }
}

/// Decode the data characteristic
pub fn parse_sensor_data(frame: &[u8]) -> Result<SensorData, CodecError> {
    if frame.len() < DATA_FRAME_LEN {
        return Err(CodecError::NotEnoughData {
            needed: DATA_FRAME_LEN,
            available: frame.len(),
        });
    }

    if frame[..DATA_FRAME_LEN] == INVALID_DATA_FRAME || frame.iter().all(|&b| b == 0) {
        return Err(CodecError::InvalidMeasurement);
    }

    let mut buf = frame;
    let raw_temperature = buf.get_i16_le();
    buf.advance(1);
    let light = buf.get_u32_le();
    let moisture = buf.get_u8();
    let conductivity = buf.get_u16_le();

    if moisture > 100 {
        return Err(CodecError::MoistureOutOfRange(moisture));
    }

    Ok(SensorData {
        temperature: f64::from(raw_temperature) / 10.0,
        light,
        moisture,
        conductivity,
    })
}

/// Decode the firmware characteristic
pub fn parse_firmware(frame: &[u8]) -> Result<FirmwareInfo, CodecError> {
    if frame.len() < FIRMWARE_FRAME_MIN_LEN {
        return Err(CodecError::NotEnoughData {
            needed: FIRMWARE_FRAME_MIN_LEN,
            available: frame.len(),
        });
    }

    let raw_version = &frame[2..];
    let raw_version = match raw_version.iter().position(|&b| b == 0) {
        Some(end) => &raw_version[..end],
        None => raw_version,
    };
    if !raw_version.is_ascii() {
        return Err(CodecError::InvalidFirmwareVersion(raw_version.to_vec()));
    }

    Ok(FirmwareInfo {
        battery: frame[0],
        version: String::from_utf8_lossy(raw_version).trim().to_string(),
    })
}

/// Encode a data frame the way the sensor lays it out
pub fn encode_sensor_data(data: &SensorData) -> [u8; DATA_FRAME_LEN] {
    let mut frame = [0u8; DATA_FRAME_LEN];
    let raw_temperature = (data.temperature * 10.0).round() as i16;
    frame[0..2].copy_from_slice(&raw_temperature.to_le_bytes());
    frame[3..7].copy_from_slice(&data.light.to_le_bytes());
    frame[7] = data.moisture;
    frame[8..10].copy_from_slice(&data.conductivity.to_le_bytes());
    frame
}
