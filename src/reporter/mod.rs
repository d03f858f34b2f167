//! Delivery of readings to the remote collection service
//!
//! This module handles:
//! - Registering the plant under the single-peripheral policy
//! - Posting one reading per tick per peripheral
//! - Turning non-2xx responses into faults

mod http;

pub use http::HttpReporter;

use async_trait::async_trait;
use miflora_shared::{PeripheralAddress, SensorReading};
use thiserror::Error;

/// Errors raised while talking to the collection service
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Backend responded with status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Transport>,
    },

    #[error("Failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Request task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Where readings are sent
#[derive(Debug, Clone)]
pub struct BackendEndpoint {
    /// Base URL of the collection service
    pub base_url: String,
    /// Plant/device name sent with every reading
    pub plant_name: String,
}

impl Default for BackendEndpoint {
    fn default() -> Self {
        Self {
            base_url: miflora_shared::defaults::BACKEND_URL.into(),
            plant_name: miflora_shared::defaults::PLANT_NAME.into(),
        }
    }
}

impl BackendEndpoint {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `POST` target for plant registration
    pub fn plant_url(&self) -> String {
        format!("{}/plant", self.base())
    }

    /// `POST` target for readings of one peripheral
    pub fn sensor_url(&self, address: &PeripheralAddress) -> String {
        format!("{}/sensor/{}", self.base(), address)
    }
}

/// Sends registrations and readings to the collection service
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Register a plant; calling it again with the same name is not an error here
    async fn register_plant(&self, name: &str) -> Result<(), ReportError>;

    /// Post one reading taken from the given peripheral
    async fn report_reading(
        &self,
        address: &PeripheralAddress,
        reading: &SensorReading,
    ) -> Result<(), ReportError>;
}
