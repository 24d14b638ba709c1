//! Tracing setup for the daemon.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Global level: trace, debug, info, warn, error.
    pub level: String,
    /// Per-crate overrides, e.g. `chaintip-rpc = "debug"`.
    pub components: HashMap<String, String>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directives for this config, components sorted by name.
    pub fn directives(&self) -> String {
        let mut parts = vec![self.level.clone()];
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            parts.push(format!("{}={}", component.replace('-', "_"), level));
        }
        parts.join(",")
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over `config`.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_components() {
        let config = LogConfig {
            level: "warn".into(),
            components: HashMap::from([
                ("chaintip-rpc".to_string(), "debug".to_string()),
                ("chaintip-core".to_string(), "trace".to_string()),
            ]),
            json: false,
        };
        assert_eq!(config.directives(), "warn,chaintip_core=trace,chaintip_rpc=debug");
    }

    #[test]
    fn default_is_info() {
        assert_eq!(LogConfig::default().directives(), "info");
    }
}
