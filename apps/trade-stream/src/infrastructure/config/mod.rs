//! Configuration Module
//!
//! Environment-driven configuration for the trade stream client.

mod settings;

pub use settings::{ClientConfig, ConfigError, DEFAULT_URL};
