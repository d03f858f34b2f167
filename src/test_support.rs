//! Mock collaborators for supervisor and startup tests

use crate::radio::{PeripheralSession, RadioBackend, RadioError};
use crate::reporter::{ReportError, Reporter};
use async_trait::async_trait;
use miflora_shared::{PeripheralAddress, SensorField, SensorReading};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::fmt::MakeWriter;

pub fn address(last: u8) -> PeripheralAddress {
    PeripheralAddress::new([0xC4, 0x7C, 0x8D, 0x00, 0x00, last])
}

/// Observations shared between a mock session and the test
#[derive(Default)]
pub struct SessionProbe {
    pub ticks_begun: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub tick_starts: Mutex<Vec<Instant>>,
    pub tick_ends: Mutex<Vec<Instant>>,
}

/// Session returning (21.5, 30, 1200, 350, 80), optionally slow or failing
pub struct MockSession {
    address: PeripheralAddress,
    read_delay: Duration,
    fail_on_tick: Option<usize>,
    ticks: usize,
    probe: Arc<SessionProbe>,
}

impl MockSession {
    pub fn new(address: PeripheralAddress) -> Self {
        Self {
            address,
            read_delay: Duration::ZERO,
            fail_on_tick: None,
            ticks: 0,
            probe: Arc::new(SessionProbe::default()),
        }
    }

    /// Each tick takes this long inside the temperature read
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Fail the temperature read of the n-th tick, starting at 1
    pub fn failing_on_tick(mut self, tick: usize) -> Self {
        self.fail_on_tick = Some(tick);
        self
    }

    pub fn probe(&self) -> Arc<SessionProbe> {
        self.probe.clone()
    }
}

#[async_trait]
impl PeripheralSession for MockSession {
    fn address(&self) -> PeripheralAddress {
        self.address
    }

    async fn firmware_version(&mut self) -> Result<String, RadioError> {
        Ok("3.2.1".into())
    }

    async fn battery_level(&mut self) -> Result<u8, RadioError> {
        Ok(80)
    }

    fn begin_tick(&mut self) {
        self.probe.ticks_begun.fetch_add(1, Ordering::SeqCst);
    }

    async fn read_field(&mut self, field: SensorField) -> Result<f64, RadioError> {
        match field {
            SensorField::Temperature => {
                self.ticks += 1;
                let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
                self.probe.tick_starts.lock().unwrap().push(Instant::now());

                if !self.read_delay.is_zero() {
                    tokio::time::sleep(self.read_delay).await;
                }
                if self.fail_on_tick == Some(self.ticks) {
                    self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Err(RadioError::Simulated {
                        address: self.address,
                        message: "radio link lost".into(),
                    });
                }
                Ok(21.5)
            }
            SensorField::Moisture => Ok(30.0),
            SensorField::Light => Ok(1200.0),
            SensorField::Conductivity => Ok(350.0),
            SensorField::Battery => {
                self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.probe.tick_ends.lock().unwrap().push(Instant::now());
                Ok(80.0)
            }
        }
    }
}

/// Reporter that records calls and answers with a fixed outcome
#[derive(Default)]
pub struct RecordingReporter {
    pub registrations: Mutex<Vec<String>>,
    pub reports: Mutex<Vec<(PeripheralAddress, SensorReading, Instant)>>,
    pub fail_status: Option<u16>,
}

impl RecordingReporter {
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Default::default()
        }
    }

    pub fn report_count(&self, address: &PeripheralAddress) -> usize {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _, _)| a == address)
            .count()
    }

    pub fn report_times(&self) -> Vec<Instant> {
        self.reports.lock().unwrap().iter().map(|(_, _, t)| *t).collect()
    }

    fn outcome(&self, url: String) -> Result<(), ReportError> {
        match self.fail_status {
            Some(status) => Err(ReportError::Status { url, status }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn register_plant(&self, name: &str) -> Result<(), ReportError> {
        self.registrations.lock().unwrap().push(name.to_string());
        self.outcome("/plant".into())
    }

    async fn report_reading(
        &self,
        address: &PeripheralAddress,
        reading: &SensorReading,
    ) -> Result<(), ReportError> {
        self.reports
            .lock()
            .unwrap()
            .push((*address, reading.clone(), Instant::now()));
        self.outcome(format!("/sensor/{address}"))
    }
}

/// Backend with a fixed discovery result and healthy mock sessions
pub struct MockBackend {
    pub available: bool,
    pub found: Vec<PeripheralAddress>,
}

#[async_trait]
impl RadioBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn discover(&self, _scan_duration: Duration) -> Result<Vec<PeripheralAddress>, RadioError> {
        Ok(self.found.clone())
    }

    async fn open_session(
        &self,
        address: PeripheralAddress,
    ) -> Result<Box<dyn PeripheralSession>, RadioError> {
        Ok(Box::new(MockSession::new(address)))
    }
}

/// In-memory log sink for asserting on emitted lines
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Plain-text subscriber writing every event into this capture
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Byte offset of the first line containing `needle`
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.contents().find(needle)
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
