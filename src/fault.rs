//! Process-level fault taxonomy
//!
//! Every fault that escapes a component is converted into a [`Fault`] exactly
//! once, logged, and mapped to the process exit code.

use crate::radio::RadioError;
use crate::reporter::ReportError;
use miflora_shared::exit_code;
use std::any::Any;
use std::fmt;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{error, info};

/// Name used in lifecycle banners
pub const BANNER_NAME: &str = "MIFLORA RELAY";

/// Layer a transport fault came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLayer {
    /// Bluetooth radio or peripheral
    Radio,
    /// HTTP collection service
    Http,
}

impl fmt::Display for TransportLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportLayer::Radio => write!(f, "Bluetooth backend"),
            TransportLayer::Http => write!(f, "Collection backend"),
        }
    }
}

/// A fault that ends the process
#[derive(Error, Debug)]
pub enum Fault {
    /// A required capability is missing before any work started
    #[error("{message}")]
    Precondition { message: String },

    /// Radio or HTTP failure
    #[error("{layer} fault")]
    Transport {
        layer: TransportLayer,
        #[source]
        cause: anyhow::Error,
    },

    /// Operator asked the process to stop
    #[error("Interrupted by user")]
    Interrupt,

    /// Anything else, including panics
    #[error("{kind}: {message}")]
    Unclassified { kind: String, message: String },
}

impl Fault {
    pub fn precondition(message: impl Into<String>) -> Self {
        Fault::Precondition {
            message: message.into(),
        }
    }

    pub fn unclassified(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Fault::Unclassified {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Convert a panic payload caught from a task
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::new()
        };
        Fault::unclassified("panic", message)
    }

    /// Convert the failure of a spawned task
    pub fn from_join_error(err: JoinError) -> Self {
        if err.is_panic() {
            Fault::from_panic(err.into_panic())
        } else {
            Fault::unclassified("cancelled", err.to_string())
        }
    }

    /// Process exit code for this fault
    pub fn exit_code(&self) -> i32 {
        match self {
            Fault::Precondition { .. } => exit_code::PRECONDITION,
            Fault::Interrupt => exit_code::INTERRUPTED,
            Fault::Transport { .. } | Fault::Unclassified { .. } => exit_code::FATAL,
        }
    }

    /// Human-readable cause, preferring the wrapped cause over the fault's own message
    pub fn describe(&self) -> String {
        let message = match self {
            Fault::Transport { cause, .. } => format!("{cause:#}"),
            Fault::Precondition { message } | Fault::Unclassified { message, .. } => {
                message.clone()
            }
            Fault::Interrupt => self.to_string(),
        };

        if message.trim().is_empty() {
            "<unknown>".into()
        } else {
            message
        }
    }

    /// Log the fault and the closing banner, returning the exit code
    pub fn log_termination(&self) -> i32 {
        match self {
            Fault::Interrupt => {
                info!("Detected CTRL+C! Exiting...");
                info!("=== {} EXITING ===", BANNER_NAME);
                return self.exit_code();
            }
            Fault::Precondition { .. } => {
                error!("{}", self.describe());
            }
            Fault::Transport {
                layer: TransportLayer::Radio,
                ..
            } => {
                error!(
                    "Received Bluetooth error! Error was: '{}' Aborting...",
                    self.describe()
                );
            }
            Fault::Transport {
                layer: TransportLayer::Http,
                ..
            } => {
                error!(
                    "Received collection backend error! Error was: '{}' Aborting...",
                    self.describe()
                );
            }
            Fault::Unclassified { kind, .. } => {
                error!(
                    "Received fault '{}', error was: '{}'! Aborting...",
                    kind,
                    self.describe()
                );
            }
        }

        info!("=== {} ABORTING ===", BANNER_NAME);
        self.exit_code()
    }
}

impl From<RadioError> for Fault {
    fn from(err: RadioError) -> Self {
        Fault::Transport {
            layer: TransportLayer::Radio,
            cause: err.into(),
        }
    }
}

impl From<ReportError> for Fault {
    fn from(err: ReportError) -> Self {
        match err {
            // The blocking request task died; classified like any other task
            ReportError::Join(join) => Fault::from_join_error(join),
            err => Fault::Transport {
                layer: TransportLayer::Http,
                cause: err.into(),
            },
        }
    }
}
