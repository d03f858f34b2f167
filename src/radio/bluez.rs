//! BlueZ radio backend and Mi Flora GATT session

use crate::radio::discovery;
use crate::radio::traits::{PeripheralSession, RadioBackend, RadioError};
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, Device, Uuid};
use miflora_shared::codec::{self, FirmwareInfo, SensorData, MODE_CHANGE_CMD};
use miflora_shared::{PeripheralAddress, SensorField};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Mi Flora data service
pub const DATA_SERVICE: Uuid = Uuid::from_u128(0x0000_1204_0000_1000_8000_0080_5f9b_34fb);

/// Mode characteristic, receives [`MODE_CHANGE_CMD`]
pub const MODE_CHAR: Uuid = Uuid::from_u128(0x0000_1a00_0000_1000_8000_0080_5f9b_34fb);

/// Live sensor data characteristic
pub const DATA_CHAR: Uuid = Uuid::from_u128(0x0000_1a01_0000_1000_8000_0080_5f9b_34fb);

/// Battery and firmware version characteristic
pub const FIRMWARE_CHAR: Uuid = Uuid::from_u128(0x0000_1a02_0000_1000_8000_0080_5f9b_34fb);

/// How often to check whether services were resolved after connecting
const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How many times to check before giving up
const SERVICES_POLL_ATTEMPTS: u32 = 40;

/// Radio backend talking to BlueZ over D-Bus
pub struct BluezBackend {
    adapter_name: String,
    cache_timeout: Duration,
}

impl BluezBackend {
    /// Create a backend bound to the named adapter (e.g. `hci0`)
    pub fn new(adapter_name: impl Into<String>, cache_timeout: Duration) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            cache_timeout,
        }
    }

    /// Get the configured adapter, powered on
    async fn adapter(&self) -> Result<Adapter, RadioError> {
        let session = bluer::Session::new().await?;
        let names = session.adapter_names().await?;
        if !names.contains(&self.adapter_name) {
            return Err(RadioError::AdapterNotFound(self.adapter_name.clone()));
        }
        let adapter = session.adapter(&self.adapter_name)?;
        adapter.set_powered(true).await?;
        Ok(adapter)
    }
}

#[async_trait]
impl RadioBackend for BluezBackend {
    fn name(&self) -> &'static str {
        "bluez"
    }

    async fn is_available(&self) -> bool {
        match self.adapter().await {
            Ok(_) => true,
            Err(e) => {
                debug!("[BT] BlueZ probe failed: {}", e);
                false
            }
        }
    }

    async fn discover(&self, scan_duration: Duration) -> Result<Vec<PeripheralAddress>, RadioError> {
        let adapter = self.adapter().await?;
        discovery::scan_adapter(&adapter, scan_duration).await
    }

    async fn open_session(
        &self,
        address: PeripheralAddress,
    ) -> Result<Box<dyn PeripheralSession>, RadioError> {
        let adapter = self.adapter().await?;
        let device = adapter.device(bluer::Address::new(address.octets()))?;
        Ok(Box::new(BluezSession::new(address, device, self.cache_timeout)))
    }
}

/// Characteristics used by one refresh
struct MifloraCharacteristics {
    mode: Characteristic,
    data: Characteristic,
    firmware: Characteristic,
}

/// Last values read from the peripheral
struct Snapshot {
    /// Tick the refresh belonged to
    tick: u64,
    /// When the refresh started
    started_at: Instant,
    firmware: FirmwareInfo,
    data: SensorData,
}

/// Snapshot cache scoped to one tick and bounded by a timeout
struct SnapshotCache {
    timeout: Duration,
    tick: u64,
    snapshot: Option<Snapshot>,
}

impl SnapshotCache {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            tick: 0,
            snapshot: None,
        }
    }

    fn begin_tick(&mut self) {
        self.tick += 1;
    }

    /// Take the cached snapshot if it may still serve reads at `now`
    fn take_fresh(&mut self, now: Instant) -> Option<Snapshot> {
        let tick = self.tick;
        let timeout = self.timeout;
        self.snapshot.take().filter(|snapshot| {
            snapshot.tick == tick && now.saturating_duration_since(snapshot.started_at) < timeout
        })
    }

    fn store(&mut self, snapshot: Snapshot) -> &Snapshot {
        self.snapshot.insert(snapshot)
    }
}

/// GATT session with one Mi Flora peripheral
///
/// One refresh reads firmware and live data in a single connection and
/// serves the `read_field` calls of the current tick, for at most
/// `cache_timeout`. The connection is closed after every refresh.
pub struct BluezSession {
    address: PeripheralAddress,
    device: Device,
    cache: SnapshotCache,
}

impl BluezSession {
    pub fn new(address: PeripheralAddress, device: Device, cache_timeout: Duration) -> Self {
        Self {
            address,
            device,
            cache: SnapshotCache::new(cache_timeout),
        }
    }

    /// Get a fresh snapshot, refreshing from the peripheral if the cache expired
    async fn snapshot(&mut self) -> Result<&Snapshot, RadioError> {
        let snapshot = match self.cache.take_fresh(Instant::now()) {
            Some(snapshot) => snapshot,
            None => self.refresh().await?,
        };
        Ok(self.cache.store(snapshot))
    }

    /// Connect, read everything, and always disconnect
    async fn refresh(&self) -> Result<Snapshot, RadioError> {
        let started_at = Instant::now();
        if !self.device.is_connected().await? {
            debug!("[BT] Connecting to {}", self.address);
            self.device.connect().await?;
        }

        let result = self.refresh_inner(started_at).await;

        if let Err(e) = self.device.disconnect().await {
            warn!("[BT] Failed to disconnect {}: {}", self.address, e);
        }

        result
    }

    /// Inner read logic, separated so the caller can always disconnect
    async fn refresh_inner(&self, started_at: Instant) -> Result<Snapshot, RadioError> {
        let chars = self.characteristics().await?;

        let firmware = codec::parse_firmware(&chars.firmware.read().await?)?;
        if firmware.requires_mode_change() {
            chars.mode.write(&MODE_CHANGE_CMD).await?;
        }
        let data = codec::parse_sensor_data(&chars.data.read().await?)?;

        debug!("[BT] {} firmware={} data={:?}", self.address, firmware, data);
        Ok(Snapshot {
            tick: self.cache.tick,
            started_at,
            firmware,
            data,
        })
    }

    /// Resolve the Mi Flora characteristics of the connected device
    async fn characteristics(&self) -> Result<MifloraCharacteristics, RadioError> {
        let mut attempts = 0;
        while !self.device.is_services_resolved().await? {
            attempts += 1;
            if attempts >= SERVICES_POLL_ATTEMPTS {
                return Err(RadioError::ServicesUnresolved(self.address));
            }
            tokio::time::sleep(SERVICES_POLL_INTERVAL).await;
        }

        let mut mode = None;
        let mut data = None;
        let mut firmware = None;

        for service in self.device.services().await? {
            if service.uuid().await? != DATA_SERVICE {
                continue;
            }
            for characteristic in service.characteristics().await? {
                match characteristic.uuid().await? {
                    uuid if uuid == MODE_CHAR => mode = Some(characteristic),
                    uuid if uuid == DATA_CHAR => data = Some(characteristic),
                    uuid if uuid == FIRMWARE_CHAR => firmware = Some(characteristic),
                    _ => {}
                }
            }
        }

        let missing = |uuid| RadioError::CharacteristicNotFound {
            address: self.address,
            uuid,
        };
        Ok(MifloraCharacteristics {
            mode: mode.ok_or_else(|| missing(MODE_CHAR))?,
            data: data.ok_or_else(|| missing(DATA_CHAR))?,
            firmware: firmware.ok_or_else(|| missing(FIRMWARE_CHAR))?,
        })
    }
}

#[async_trait]
impl PeripheralSession for BluezSession {
    fn address(&self) -> PeripheralAddress {
        self.address
    }

    async fn firmware_version(&mut self) -> Result<String, RadioError> {
        Ok(self.snapshot().await?.firmware.version.clone())
    }

    async fn battery_level(&mut self) -> Result<u8, RadioError> {
        Ok(self.snapshot().await?.firmware.battery)
    }

    fn begin_tick(&mut self) {
        self.cache.begin_tick();
    }

    async fn read_field(&mut self, field: SensorField) -> Result<f64, RadioError> {
        let snapshot = self.snapshot().await?;
        let value = match field {
            SensorField::Temperature => snapshot.data.temperature,
            SensorField::Moisture => f64::from(snapshot.data.moisture),
            SensorField::Light => f64::from(snapshot.data.light),
            SensorField::Conductivity => f64::from(snapshot.data.conductivity),
            SensorField::Battery => f64::from(snapshot.firmware.battery),
        };
        Ok(value)
    }
}
