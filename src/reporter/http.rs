//! HTTP reporter using a blocking `ureq` agent

use super::{BackendEndpoint, ReportError, Reporter};
use async_trait::async_trait;
use miflora_shared::{PeripheralAddress, PlantRegistration, ReadingReport, SensorReading};
use tracing::{debug, info};
use ureq::Agent;

/// Posts JSON bodies to the collection service
pub struct HttpReporter {
    endpoint: BackendEndpoint,
    agent: Agent,
}

impl HttpReporter {
    /// Create a reporter for the given endpoint
    pub fn new(endpoint: BackendEndpoint) -> Self {
        Self {
            endpoint,
            agent: Agent::new(),
        }
    }

    /// POST a body on the blocking pool so only the calling job waits
    async fn post_json(&self, url: String, body: String) -> Result<(), ReportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || post_blocking(&agent, &url, &body)).await?
    }
}

/// POST a JSON body and require a 2xx status
fn post_blocking(agent: &Agent, url: &str, body: &str) -> Result<(), ReportError> {
    let response = match agent
        .post(url)
        .set("Content-Type", "application/json")
        .send_string(body)
    {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            debug!("[REPORT] {} -> {}: {}", url, status, response.into_string().unwrap_or_default());
            return Err(ReportError::Status {
                url: url.to_string(),
                status,
            });
        }
        Err(ureq::Error::Transport(transport)) => {
            return Err(ReportError::Transport {
                url: url.to_string(),
                source: Box::new(transport),
            });
        }
    };

    let status = response.status();
    debug!("[REPORT] {} -> {}: {}", url, status, response.into_string().unwrap_or_default());

    if !(200..300).contains(&status) {
        return Err(ReportError::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(())
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn register_plant(&self, name: &str) -> Result<(), ReportError> {
        info!("[REPORT] Registering plant '{}' in backend...", name);
        let body = serde_json::to_string(&PlantRegistration::new(name))?;
        self.post_json(self.endpoint.plant_url(), body).await?;
        info!("[REPORT] Registration successful!");
        Ok(())
    }

    async fn report_reading(
        &self,
        address: &PeripheralAddress,
        reading: &SensorReading,
    ) -> Result<(), ReportError> {
        info!(
            "[REPORT] Sending plant status for '{}' ({})...",
            self.endpoint.plant_name, address
        );
        let body = serde_json::to_string(&ReadingReport::new(&self.endpoint.plant_name, reading))?;
        self.post_json(self.endpoint.sensor_url(address), body).await?;
        info!("[REPORT] Sending plant status was successful!");
        Ok(())
    }
}
