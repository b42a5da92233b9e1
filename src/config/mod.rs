//! Configuration module.
//!
//! Supports JSON configuration files, environment variable overrides, and
//! sensible defaults.
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`server`]: Room lifecycle, grace periods, lock TTLs, rate policies
//! - [`protocol`]: Wire-facing settings (nickname bounds, PIN length)
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Startup sanity checks
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod types;
pub mod validation;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use protocol::ProtocolConfig;
pub use server::{RateLimitConfig, RatePolicy, ServerConfig};
pub use types::Config;
pub use validation::validate_config;
