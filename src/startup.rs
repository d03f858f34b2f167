//! Startup sequence
//!
//! Probe backend, announce, discover, open sessions, register the plant,
//! then hand the jobs to the supervisor.

use crate::config::Config;
use crate::fault::{Fault, BANNER_NAME};
use crate::radio::{self, Discovery, DiscoveryPolicy, RadioBackend};
use crate::reporter::{HttpReporter, Reporter};
use crate::supervisor::Supervisor;
use std::sync::Arc;
use tracing::info;

/// Run the relay until a fault ends it
pub async fn run(config: Config) -> Fault {
    let backend = radio::backend_for(&config.radio);
    let reporter: Arc<dyn Reporter> = Arc::new(HttpReporter::new(config.endpoint.clone()));

    match start(backend.as_ref(), reporter, &config).await {
        Ok(supervisor) => supervisor.run().await,
        Err(fault) => fault,
    }
}

/// Everything that happens before the first tick
pub async fn start(
    backend: &dyn RadioBackend,
    reporter: Arc<dyn Reporter>,
    config: &Config,
) -> Result<Supervisor, Fault> {
    if !backend.is_available().await {
        return Err(Fault::precondition(format!(
            "Bluetooth LE backend '{}' was unavailable! Exiting...",
            backend.name()
        )));
    }

    info!("=== {} STARTING (Backend: {}) ===", BANNER_NAME, backend.name());

    let discovery = Discovery::new(config.discovery.clone());
    let addresses = discovery.discover(backend).await?;

    let mut supervisor = Supervisor::new(config.supervisor.clone(), reporter.clone());
    for address in addresses {
        let session = backend.open_session(address).await?;
        supervisor.adopt(session).await?;
    }

    if config.discovery.policy == DiscoveryPolicy::Single {
        reporter.register_plant(&config.endpoint.plant_name).await?;
    }

    Ok(supervisor)
}
