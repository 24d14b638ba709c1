//! Follower configuration.
//!
//! All fields have defaults, so an empty TOML table is a valid config that
//! follows Arbitrum Sepolia through its public endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffConfig;
use crate::error::TipError;
use crate::health::HealthConfig;
use crate::pool::EndpointPool;
use crate::publisher::DEFAULT_CHANNEL_CAPACITY;
use crate::supervisor::RestartPolicy;

/// Subscription endpoints used when none are configured.
pub const DEFAULT_SUBSCRIPTION_ENDPOINTS: &[&str] = &[
    "wss://arbitrum-sepolia.public.blastapi.io",
    "wss://endpoints.omniatech.io/v1/arbitrum/sepolia/public/ws",
];

/// Polling endpoints used when none are configured.
pub const DEFAULT_POLLING_ENDPOINTS: &[&str] = &[
    "https://sepolia-rollup.arbitrum.io/rpc",
    "https://arbitrum-sepolia.public.blastapi.io",
    "https://endpoints.omniatech.io/v1/arbitrum/sepolia/public",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    pub subscription_endpoints: Vec<String>,
    pub polling_endpoints: Vec<String>,
    pub filter_interval_ms: u64,
    pub poll_interval_ms: u64,
    /// Accepted distance below the highest stored height. `None` turns the
    /// floor off and leaves deduplication to the existence check.
    pub gap_window: Option<u64>,
    pub channel_capacity: usize,
    pub health: HealthConfig,
    pub restart: RestartConfig,
    pub shutdown_grace_secs: u64,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            subscription_endpoints: to_strings(DEFAULT_SUBSCRIPTION_ENDPOINTS),
            polling_endpoints: to_strings(DEFAULT_POLLING_ENDPOINTS),
            filter_interval_ms: 1_000,
            poll_interval_ms: 12_000,
            gap_window: Some(0),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            health: HealthConfig::default(),
            restart: RestartConfig::default(),
            shutdown_grace_secs: 10,
        }
    }
}

fn to_strings(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|s| s.to_string()).collect()
}

impl FollowerConfig {
    pub fn validate(&self) -> Result<(), TipError> {
        if self.subscription_endpoints.is_empty() && self.polling_endpoints.is_empty() {
            return Err(TipError::Config("no endpoints configured".into()));
        }
        if self.filter_interval_ms == 0 || self.poll_interval_ms == 0 {
            return Err(TipError::Config("tick intervals must be non-zero".into()));
        }
        if self.channel_capacity == 0 {
            return Err(TipError::Config("channel_capacity must be non-zero".into()));
        }
        if self.restart.initial_backoff_secs > self.restart.max_backoff_secs {
            return Err(TipError::Config(
                "restart.initial_backoff_secs exceeds restart.max_backoff_secs".into(),
            ));
        }
        Ok(())
    }

    pub fn filter_interval(&self) -> Duration {
        Duration::from_millis(self.filter_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn build_pool(&self) -> EndpointPool {
        EndpointPool::new(
            self.subscription_endpoints.iter().cloned(),
            self.polling_endpoints.iter().cloned(),
            self.health.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    /// Stop after this many consecutive exhausted cycles (`None` = never).
    pub max_restarts: Option<u32>,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: 5,
            max_backoff_secs: 300,
            max_restarts: None,
        }
    }
}

impl From<&RestartConfig> for RestartPolicy {
    fn from(c: &RestartConfig) -> Self {
        RestartPolicy {
            backoff: BackoffConfig {
                max_retries: c.max_restarts,
                initial: Duration::from_secs(c.initial_backoff_secs),
                max: Duration::from_secs(c.max_backoff_secs),
                multiplier: 2.0,
            },
        }
    }
}
