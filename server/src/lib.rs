pub mod api;
pub mod config;

pub use config::{ConfigError, ServerConfig};
