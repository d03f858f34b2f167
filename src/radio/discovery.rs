//! Bluetooth discovery of Mi Flora peripherals

use crate::fault::Fault;
use crate::radio::traits::{RadioBackend, RadioError};
use bluer::{Adapter, AdapterEvent};
use futures::StreamExt;
use miflora_shared::PeripheralAddress;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Advertised names of Mi Flora peripherals, compared case-insensitively
pub const MIFLORA_NAMES: [&str; 2] = ["flower care", "flower mate"];

/// Xiaomi OUI every Mi Flora address starts with
pub const XIAOMI_PREFIX: [u8; 3] = [0xC4, 0x7C, 0x8D];

/// How many discovered peripherals are acceptable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DiscoveryPolicy {
    /// Exactly one peripheral must be found; the plant is registered
    #[default]
    Single,
    /// Any number of peripherals, including none
    Multi,
}

/// Configuration for peripheral discovery
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How long to scan for devices
    pub scan_duration: Duration,
    /// How many discovered peripherals are acceptable
    pub policy: DiscoveryPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(miflora_shared::defaults::SCAN_DURATION_SECS),
            policy: DiscoveryPolicy::Single,
        }
    }
}

/// Check if an advertised device is a Mi Flora peripheral
pub fn is_miflora(name: Option<&str>, address: &PeripheralAddress) -> bool {
    if address.has_prefix(&XIAOMI_PREFIX) {
        return true;
    }

    match name {
        Some(name) => MIFLORA_NAMES.contains(&name.trim().to_lowercase().as_str()),
        None => false,
    }
}

/// Peripheral discovery service
pub struct Discovery {
    config: DiscoveryConfig,
}

impl Discovery {
    /// Create a new discovery service
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Scan with the given backend and apply the discovery policy
    pub async fn discover(&self, backend: &dyn RadioBackend) -> Result<Vec<PeripheralAddress>, Fault> {
        info!(
            "[BT] Scanning for {} seconds...",
            self.config.scan_duration.as_secs()
        );
        let found = backend.discover(self.config.scan_duration).await?;
        self.apply_policy(found)
    }

    /// Accept or reject a discovery result according to the policy
    pub fn apply_policy(&self, found: Vec<PeripheralAddress>) -> Result<Vec<PeripheralAddress>, Fault> {
        match self.config.policy {
            DiscoveryPolicy::Single if found.len() != 1 => Err(Fault::precondition(format!(
                "Did not find exactly 1 Mi Flora peripheral, found {} instead! Exiting...",
                found.len()
            ))),
            DiscoveryPolicy::Single => {
                info!("[BT] Found Mi Flora peripheral with MAC address '{}'.", found[0]);
                Ok(found)
            }
            DiscoveryPolicy::Multi => {
                if found.is_empty() {
                    warn!("[BT] No Mi Flora peripherals found, nothing will be polled");
                }
                for address in &found {
                    info!("[BT] Found Mi Flora peripheral with MAC address '{}'.", address);
                }
                Ok(found)
            }
        }
    }
}

/// Scan an adapter for Mi Flora peripherals
pub async fn scan_adapter(
    adapter: &Adapter,
    scan_duration: Duration,
) -> Result<Vec<PeripheralAddress>, RadioError> {
    let mut found = Vec::new();
    let mut seen: HashSet<bluer::Address> = HashSet::new();

    let discover = adapter.discover_devices().await?;
    tokio::pin!(discover);

    let scan_result = timeout(scan_duration, async {
        while let Some(evt) = discover.next().await {
            if let AdapterEvent::DeviceAdded(addr) = evt {
                if !seen.insert(addr) {
                    continue;
                }

                let address = PeripheralAddress::new(addr.0);
                let name = match adapter.device(addr) {
                    Ok(device) => device.name().await.ok().flatten(),
                    Err(_) => None,
                };
                debug!("[BT] Saw {} ({:?})", address, name);

                if is_miflora(name.as_deref(), &address) {
                    found.push(address);
                }
            }
        }
    })
    .await;

    // Timeout is expected, not an error
    if scan_result.is_err() {
        info!("[BT] Discovery scan completed");
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use miflora_shared::exit_code;

    fn address(last: u8) -> PeripheralAddress {
        PeripheralAddress::new([0xC4, 0x7C, 0x8D, 0x00, 0x00, last])
    }

    fn discovery(policy: DiscoveryPolicy) -> Discovery {
        Discovery::new(DiscoveryConfig {
            policy,
            ..Default::default()
        })
    }

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.scan_duration, Duration::from_secs(10));
        assert_eq!(config.policy, DiscoveryPolicy::Single);
    }

    #[test]
    fn test_miflora_filter() {
        let other = PeripheralAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert!(is_miflora(Some("Flower care"), &other));
        assert!(is_miflora(Some("flower mate"), &other));
        assert!(is_miflora(None, &address(1)));
        assert!(!is_miflora(Some("Mi Band"), &other));
        assert!(!is_miflora(None, &other));
    }

    #[test]
    fn test_single_policy_requires_exactly_one() {
        let single = discovery(DiscoveryPolicy::Single);

        assert_eq!(single.apply_policy(vec![address(1)]).unwrap(), vec![address(1)]);

        for found in [vec![], vec![address(1), address(2)]] {
            let fault = single.apply_policy(found).unwrap_err();
            assert_eq!(fault.exit_code(), exit_code::PRECONDITION);
        }
    }

    #[test]
    fn test_multi_policy_accepts_any_count() {
        let multi = discovery(DiscoveryPolicy::Multi);
        assert!(multi.apply_policy(vec![]).unwrap().is_empty());
        assert_eq!(
            multi.apply_policy(vec![address(1), address(2)]).unwrap().len(),
            2
        );
    }
}
