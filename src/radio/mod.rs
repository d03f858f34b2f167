//! Radio access for Mi Flora peripherals
//!
//! This module handles:
//! - Probing whether the selected Bluetooth backend is usable
//! - Scanning for peripherals and applying the discovery policy
//! - GATT sessions reading firmware, battery and telemetry

pub mod bluez;
pub mod discovery;
pub mod simulated;
pub mod traits;

pub use bluez::BluezBackend;
pub use discovery::{Discovery, DiscoveryConfig, DiscoveryPolicy};
pub use simulated::{SimulatedBackend, SimulationConfig};
pub use traits::{PeripheralSession, RadioBackend, RadioError};

use std::time::Duration;

/// Available radio backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RadioBackendKind {
    /// BlueZ over D-Bus (requires bluetoothd)
    #[default]
    Bluez,
    /// In-process peripherals (for development)
    Simulated,
}

impl std::fmt::Display for RadioBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadioBackendKind::Bluez => write!(f, "bluez"),
            RadioBackendKind::Simulated => write!(f, "simulated"),
        }
    }
}

/// Radio configuration
#[derive(Debug, Clone)]
pub struct RadioConfig {
    /// Which backend to use
    pub backend: RadioBackendKind,
    /// Bluetooth adapter name
    pub adapter: String,
    /// How long one sensor refresh serves reads
    pub cache_timeout: Duration,
    /// Simulated backend settings
    pub simulation: SimulationConfig,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            backend: RadioBackendKind::Bluez,
            adapter: miflora_shared::defaults::ADAPTER.into(),
            cache_timeout: Duration::from_secs(miflora_shared::defaults::CACHE_TIMEOUT_SECS),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Build the configured backend
pub fn backend_for(config: &RadioConfig) -> Box<dyn RadioBackend> {
    match config.backend {
        RadioBackendKind::Bluez => {
            Box::new(BluezBackend::new(config.adapter.clone(), config.cache_timeout))
        }
        RadioBackendKind::Simulated => Box::new(SimulatedBackend::new(config.simulation.clone())),
    }
}
