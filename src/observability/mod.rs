//! # Observability
//!
//! Structured logging setup for binaries embedding the credential engine.

pub mod logging;

pub use logging::{init_logging, log_config_info, LoggingConfig};
