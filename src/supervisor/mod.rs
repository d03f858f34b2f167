//! Polling Supervisor
//!
//! Owns one polling job per discovered peripheral, runs them as independent
//! tasks and decides what a job fault means for the rest of the process.

mod job;
mod root;

pub use job::{JobContext, PollingJob};
pub use root::{interrupt_signal, supervise};

use crate::fault::Fault;
use crate::radio::PeripheralSession;
use crate::reporter::Reporter;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// What a fault in one polling job does to the others
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailureIsolation {
    /// The first job fault aborts the whole process
    #[default]
    None,
    /// A faulted job ends alone; the others keep polling
    PerPeripheral,
}

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between two ticks of the same peripheral
    pub polling_interval: Duration,
    /// Failure isolation policy
    pub isolation: FailureIsolation,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(
                miflora_shared::defaults::POLLING_INTERVAL_MINUTES * 60,
            ),
            isolation: FailureIsolation::None,
        }
    }
}

/// Supervises one polling job per peripheral
pub struct Supervisor {
    config: SupervisorConfig,
    reporter: Arc<dyn Reporter>,
    jobs: Vec<PollingJob>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            config,
            reporter,
            jobs: Vec::new(),
        }
    }

    /// Number of jobs that will be started
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Create a job for a session and run its startup probe
    pub async fn adopt(&mut self, session: Box<dyn PeripheralSession>) -> Result<(), Fault> {
        let address = session.address();
        if self.jobs.iter().any(|job| job.address() == address) {
            warn!("[SUPERVISOR] Peripheral {} already has a polling job", address);
            return Ok(());
        }

        let mut job = PollingJob::new(session);
        job.probe().await?;
        debug!("[SUPERVISOR] Job for {} is {}", address, job.state());
        self.jobs.push(job);
        Ok(())
    }

    /// Run every job until a fault ends the supervisor
    ///
    /// Returning drops the `JoinSet`, which aborts the jobs still running.
    pub async fn run(self) -> Fault {
        let ctx = JobContext {
            reporter: self.reporter.clone(),
            interval: self.config.polling_interval,
        };

        info!(
            "[SUPERVISOR] Polling {} peripheral(s) every {}s (failure isolation: {:?})",
            self.job_count(),
            ctx.interval.as_secs(),
            self.config.isolation
        );

        let mut jobs = JoinSet::new();
        for job in self.jobs {
            let ctx = ctx.clone();
            let address = job.address();
            jobs.spawn(async move {
                let fault = AssertUnwindSafe(job.run(ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(Fault::from_panic);
                (address, fault)
            });
        }

        let started = jobs.len();
        while let Some(joined) = jobs.join_next().await {
            let (address, fault) = match joined {
                Ok(ended) => ended,
                Err(e) => return Fault::from_join_error(e),
            };

            match self.config.isolation {
                FailureIsolation::None => {
                    error!(
                        "[SUPERVISOR] Polling job for {} failed, stopping all jobs",
                        address
                    );
                    return fault;
                }
                FailureIsolation::PerPeripheral => {
                    error!(
                        "[SUPERVISOR] Polling job for {} terminated ({}): {}",
                        address,
                        fault,
                        fault.describe()
                    );
                }
            }
        }

        if started == 0 {
            warn!("[SUPERVISOR] No peripherals to poll, idling until interrupted");
        } else {
            warn!("[SUPERVISOR] All polling jobs terminated, idling until interrupted");
        }
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::TransportLayer;
    use crate::test_support::{address, MockSession, RecordingReporter};
    use tokio::time::timeout;

    fn supervisor(reporter: Arc<RecordingReporter>, isolation: FailureIsolation) -> Supervisor {
        Supervisor::new(
            SupervisorConfig {
                polling_interval: Duration::from_secs(60),
                isolation,
            },
            reporter,
        )
    }

    #[test]
    fn test_default_config() {
        let config = SupervisorConfig::default();
        assert_eq!(config.polling_interval, Duration::from_secs(600));
        assert_eq!(config.isolation, FailureIsolation::None);
    }

    #[tokio::test]
    async fn test_one_job_per_address() {
        let mut supervisor = supervisor(Arc::default(), FailureIsolation::None);
        supervisor.adopt(Box::new(MockSession::new(address(1)))).await.unwrap();
        supervisor.adopt(Box::new(MockSession::new(address(2)))).await.unwrap();
        supervisor.adopt(Box::new(MockSession::new(address(1)))).await.unwrap();
        assert_eq!(supervisor.job_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_poll_independently() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut supervisor = supervisor(reporter.clone(), FailureIsolation::None);
        supervisor.adopt(Box::new(MockSession::new(address(1)))).await.unwrap();
        supervisor
            .adopt(Box::new(
                MockSession::new(address(2)).with_read_delay(Duration::from_secs(50)),
            ))
            .await
            .unwrap();

        let result = timeout(Duration::from_secs(130), supervisor.run()).await;
        assert!(result.is_err(), "healthy jobs run until interrupted");

        // The slow peripheral does not hold back the fast one
        assert_eq!(reporter.report_count(&address(1)), 3);
        assert_eq!(reporter.report_count(&address(2)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_in_one_job_aborts_all() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut supervisor = supervisor(reporter.clone(), FailureIsolation::None);
        supervisor.adopt(Box::new(MockSession::new(address(1)))).await.unwrap();
        supervisor
            .adopt(Box::new(MockSession::new(address(2)).failing_on_tick(2)))
            .await
            .unwrap();

        let fault = timeout(Duration::from_secs(600), supervisor.run())
            .await
            .expect("fault ends the supervisor");

        assert!(matches!(
            fault,
            Fault::Transport {
                layer: TransportLayer::Radio,
                ..
            }
        ));
        assert_eq!(fault.exit_code(), -1);
        assert!(fault.describe().contains("radio link lost"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_peripheral_isolation_keeps_others_running() {
        let reporter = Arc::new(RecordingReporter::default());
        let mut supervisor = supervisor(reporter.clone(), FailureIsolation::PerPeripheral);
        supervisor.adopt(Box::new(MockSession::new(address(1)))).await.unwrap();
        supervisor
            .adopt(Box::new(MockSession::new(address(2)).failing_on_tick(1)))
            .await
            .unwrap();

        let result = timeout(Duration::from_secs(250), supervisor.run()).await;
        assert!(result.is_err(), "remaining job keeps the supervisor alive");

        assert_eq!(reporter.report_count(&address(1)), 5);
        assert_eq!(reporter.report_count(&address(2)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_jobs_idles() {
        let supervisor = supervisor(Arc::default(), FailureIsolation::None);
        let result = timeout(Duration::from_secs(3600), supervisor.run()).await;
        assert!(result.is_err());
    }
}
