//! # Link Telemetry
//!
//! Logging setup shared by the ledger-link binaries. Libraries only emit
//! `tracing` events; installing a subscriber is left to the binary.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use link_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     init_logging(&TelemetryConfig::from_env()).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LINK_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `LINK_JSON_LOGS` | `false` | JSON instead of pretty output |
//! | `LINK_SERVICE_NAME` | `ledger-link` | Service name in log records |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}
