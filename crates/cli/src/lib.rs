//! Process-level pieces of the SMS gateway: options, secrets, logging,
//! telemetry sinks and the HTTP API.

pub mod cli;
pub mod config;
pub mod http;
pub mod logging;
pub mod secrets;
pub mod sinks;

pub use config::{ConfigError, GatewayConfig};
pub use secrets::SecretResolver;
