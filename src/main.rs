mod config;
mod fault;
mod radio;
mod reporter;
mod startup;
mod supervisor;

#[cfg(test)]
mod test_support;

use clap::Parser;
use config::{Args, Config};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    let config = Config::from(Args::parse());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(config.log_level.into()))
        .init();

    info!("Plant name: {}", config.endpoint.plant_name);
    info!("  Backend: {}", config.endpoint.base_url);
    info!(
        "  Radio: {} ({})",
        config.radio.backend, config.radio.adapter
    );
    debug!("Configuration: {:?}", config);

    let fault = supervisor::supervise(startup::run(config), supervisor::interrupt_signal()).await;
    std::process::exit(fault.log_termination());
}
