//! Polling job for one peripheral

use crate::fault::Fault;
use crate::radio::{PeripheralSession, RadioError};
use crate::reporter::Reporter;
use miflora_shared::state_machine::{JobEvent, JobLifecycle, JobState, TransitionResult};
use miflora_shared::{now_ms, PeripheralAddress, SensorField, SensorReading};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Read-only state shared by every job
#[derive(Clone)]
pub struct JobContext {
    /// Where readings go
    pub reporter: Arc<dyn Reporter>,
    /// Time between two ticks
    pub interval: Duration,
}

/// Repeating read-and-report job bound to one peripheral
pub struct PollingJob {
    address: PeripheralAddress,
    session: Box<dyn PeripheralSession>,
    lifecycle: JobLifecycle,
}

impl PollingJob {
    /// Create a job owning the given session
    pub fn new(session: Box<dyn PeripheralSession>) -> Self {
        Self {
            address: session.address(),
            session,
            lifecycle: JobLifecycle::new(),
        }
    }

    pub fn address(&self) -> PeripheralAddress {
        self.address
    }

    pub fn state(&self) -> JobState {
        self.lifecycle.state()
    }

    /// Read and log firmware and battery once
    pub async fn probe(&mut self) -> Result<(), Fault> {
        info!("[JOB {}] Getting basic statistics about device...", self.address);

        let result = async {
            let firmware = self.session.firmware_version().await?;
            let battery = self.session.battery_level().await?;
            Ok::<_, RadioError>((firmware, battery))
        }
        .await;

        match result {
            Ok((firmware, battery)) => {
                info!(
                    "[JOB {}] Mi Flora Firmware: {}, Battery Status: {} percent",
                    self.address, firmware, battery
                );
                self.transition(JobEvent::ProbeCompleted);
                Ok(())
            }
            Err(e) => {
                let fault = Fault::from(e);
                self.transition(JobEvent::Faulted {
                    exit_code: fault.exit_code(),
                });
                Err(fault)
            }
        }
    }

    /// Tick forever; only returns with the fault that ended the job
    pub async fn run(mut self, ctx: JobContext) -> Fault {
        self.transition(JobEvent::TimerStarted);

        let mut ticker = interval(ctx.interval);
        // An overrunning tick pushes the schedule back instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(fault) = self.tick(&ctx).await {
                self.transition(JobEvent::Faulted {
                    exit_code: fault.exit_code(),
                });
                return fault;
            }
            self.transition(JobEvent::TickCompleted);
        }
    }

    /// Read all fields and report them
    pub async fn tick(&mut self, ctx: &JobContext) -> Result<(), Fault> {
        info!("[JOB {}] Time's up! Fetching new sensor data...", self.address);

        self.session.begin_tick();
        let reading = self.read_reading().await?;
        ctx.reporter.report_reading(&self.address, &reading).await?;
        Ok(())
    }

    async fn read_reading(&mut self) -> Result<SensorReading, RadioError> {
        let mut values = [0.0; SensorField::ALL.len()];
        for (value, field) in values.iter_mut().zip(SensorField::ALL) {
            *value = self.session.read_field(field).await?;
        }
        let [temperature, moisture, light, conductivity, battery] = values;

        Ok(SensorReading {
            temperature,
            moisture: moisture.round() as u32,
            light: light.round() as u32,
            conductivity: conductivity.round() as u32,
            battery: battery.round() as u32,
            timestamp_ms: now_ms(),
        })
    }

    fn transition(&mut self, event: JobEvent) {
        match self.lifecycle.process_event(event) {
            TransitionResult::Success(state) => {
                debug!(
                    "[JOB {}] {} (ticks: {})",
                    self.address,
                    state,
                    self.lifecycle.ticks()
                );
            }
            TransitionResult::Invalid { from, event } => {
                warn!(
                    "[JOB {}] Ignoring {:?} in state {}",
                    self.address, event, from
                );
            }
        }
    }
}
