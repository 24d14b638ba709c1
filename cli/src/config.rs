//! Daemon configuration: TOML file, then command-line and environment
//! overrides on top.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use chaintip_core::FollowerConfig;
use chaintip_server::ServerConfig;

use crate::logging::LogConfig;
use crate::Cli;

/// Database used when neither the file nor `DATABASE_URL` names one.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:chaintip.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `sqlite:<path>`, `postgres://...` or `memory`.
    pub database_url: String,
    pub follower: FollowerConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.into(),
            follower: FollowerConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read `path`, or start from defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Values given on the command line (or through their env vars) win.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(addr) = &cli.listen {
            self.server.listen_addr = addr.clone();
        }
        if let Some(level) = &cli.log_level {
            self.log.level = level.clone();
        }
        if cli.json_logs {
            self.log.json = true;
        }
        if !cli.subscription_endpoint.is_empty() {
            self.follower.subscription_endpoints = cli.subscription_endpoint.clone();
        }
        if !cli.polling_endpoint.is_empty() {
            self.follower.polling_endpoints = cli.polling_endpoint.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.api_prefix, "/api/v1");
        assert_eq!(config.follower.gap_window, Some(0));
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            database_url = "postgres://localhost/blocks"

            [follower]
            polling_endpoints = ["https://rpc.example"]
            poll_interval_ms = 2000

            [follower.restart]
            max_restarts = 3

            [server]
            project_name = "Tip Watch"

            [log]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.database_url, "postgres://localhost/blocks");
        assert_eq!(config.follower.polling_endpoints, vec!["https://rpc.example"]);
        assert_eq!(config.follower.poll_interval_ms, 2000);
        assert_eq!(config.follower.restart.max_restarts, Some(3));
        assert_eq!(config.follower.filter_interval_ms, 1_000);
        assert!(!config.follower.subscription_endpoints.is_empty());
        assert_eq!(config.server.project_name, "Tip Watch");
        assert_eq!(config.server.listen_addr, "0.0.0.0:8000");
        assert!(config.log.json);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(AppConfig::from_toml("[follower]\npoll_interval_ms = \"fast\"").is_err());
    }

    #[test]
    fn cli_overrides_file_values() {
        let mut config = AppConfig::from_toml("database_url = \"sqlite:file.db\"").unwrap();
        let cli = Cli::parse_from([
            "chaintip",
            "--database-url",
            "memory",
            "--listen",
            "127.0.0.1:9000",
            "--polling-endpoint",
            "https://a",
            "--polling-endpoint",
            "https://b",
            "--json-logs",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.database_url, "memory");
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.follower.polling_endpoints, vec!["https://a", "https://b"]);
        assert!(config.log.json);
        // untouched
        assert_eq!(config.log.level, "info");
        assert!(!config.follower.subscription_endpoints.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/chaintip.toml"))).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
