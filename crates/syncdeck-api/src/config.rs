use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;

use syncdeck_core::config::ConfigError as EngineConfigError;
use syncdeck_core::EngineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Engine(#[from] EngineConfigError),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "SYNCDECK_API_BIND_ADDR", "127.0.0.1:8000");
        if bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(
                "SYNCDECK_API_BIND_ADDR must be a socket address like 127.0.0.1:8000".to_string(),
            ));
        }

        let engine = EngineConfig::from_lookup(&lookup)?;
        Ok(Self { bind_addr, engine })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
