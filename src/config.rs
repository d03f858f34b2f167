//! Command-line and environment configuration

use crate::radio::{DiscoveryConfig, DiscoveryPolicy, RadioBackendKind, RadioConfig, SimulationConfig};
use crate::reporter::BackendEndpoint;
use crate::supervisor::{FailureIsolation, SupervisorConfig};
use clap::Parser;
use miflora_shared::defaults;
use std::time::Duration;
use tracing::Level;

/// Longest accepted polling interval, one week
pub const MAX_POLLING_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Polls Mi Flora plant sensors over Bluetooth LE and relays readings over HTTP
#[derive(Debug, Parser)]
#[command(name = "miflora-relay", version, about)]
pub struct Args {
    /// Plant name reported to the backend
    #[arg(long, env = "MIFLORA_PLANT_NAME", default_value = defaults::PLANT_NAME)]
    pub plant_name: String,

    /// Polling interval in minutes, at most one week
    #[arg(
        long,
        env = "MIFLORA_POLLING_INTERVAL",
        default_value_t = defaults::POLLING_INTERVAL_MINUTES,
        value_parser = clap::value_parser!(u64).range(1..=MAX_POLLING_INTERVAL_MINUTES)
    )]
    pub polling_interval: u64,

    /// How long to scan for peripherals, in seconds
    #[arg(
        long,
        env = "MIFLORA_SCAN_DURATION",
        default_value_t = defaults::SCAN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub scan_duration: u64,

    /// Log level (`error`, `warn`, `info`, `debug`, `trace`)
    #[arg(long, env = "MIFLORA_LOG_LEVEL", default_value = "info")]
    pub log_level: Level,

    /// Base URL of the collection service
    #[arg(long, env = "MIFLORA_BACKEND_URL", default_value = defaults::BACKEND_URL)]
    pub backend_url: String,

    /// Bluetooth backend
    #[arg(long, env = "MIFLORA_RADIO_BACKEND", value_enum, default_value_t = RadioBackendKind::Bluez)]
    pub radio_backend: RadioBackendKind,

    /// Bluetooth adapter
    #[arg(long, env = "MIFLORA_ADAPTER", default_value = defaults::ADAPTER)]
    pub adapter: String,

    /// How many discovered peripherals are acceptable
    #[arg(long, env = "MIFLORA_DISCOVERY", value_enum, default_value_t = DiscoveryPolicy::Single)]
    pub discovery: DiscoveryPolicy,

    /// What a fault in one polling job does to the others
    #[arg(long, env = "MIFLORA_FAILURE_ISOLATION", value_enum, default_value_t = FailureIsolation::None)]
    pub failure_isolation: FailureIsolation,

    /// How long one sensor refresh serves reads, in seconds
    #[arg(long, env = "MIFLORA_CACHE_TIMEOUT", default_value_t = defaults::CACHE_TIMEOUT_SECS)]
    pub cache_timeout: u64,

    /// Number of peripherals the simulated backend finds
    #[arg(long, env = "MIFLORA_SIMULATED_PERIPHERALS", default_value_t = 1)]
    pub simulated_peripherals: u8,

    /// Make simulated sessions fail after this many field reads
    #[arg(long, env = "MIFLORA_SIMULATED_FAIL_AFTER")]
    pub simulated_fail_after: Option<u32>,
}

/// Complete process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum log level
    pub log_level: Level,
    /// Collection service endpoint
    pub endpoint: BackendEndpoint,
    /// Radio backend selection
    pub radio: RadioConfig,
    /// Discovery settings
    pub discovery: DiscoveryConfig,
    /// Polling settings
    pub supervisor: SupervisorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            endpoint: BackendEndpoint::default(),
            radio: RadioConfig::default(),
            discovery: DiscoveryConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            log_level: args.log_level,
            endpoint: BackendEndpoint {
                base_url: args.backend_url,
                plant_name: args.plant_name,
            },
            radio: RadioConfig {
                backend: args.radio_backend,
                adapter: args.adapter,
                cache_timeout: Duration::from_secs(args.cache_timeout),
                simulation: SimulationConfig {
                    peripherals: args.simulated_peripherals,
                    fail_after_reads: args.simulated_fail_after,
                    available: true,
                },
            },
            discovery: DiscoveryConfig {
                scan_duration: Duration::from_secs(args.scan_duration),
                policy: args.discovery,
            },
            supervisor: SupervisorConfig {
                polling_interval: Duration::from_secs(args.polling_interval * 60),
                isolation: args.failure_isolation,
            },
        }
    }
}
