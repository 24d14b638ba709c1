//! Per-endpoint health tracking with a cool-down window.
//!
//! State transitions:
//! - `Healthy` → `CoolingDown`: consecutive failures reach `failure_threshold`
//! - `CoolingDown` → `Probing`: `cooldown` has elapsed
//! - `Probing` → `Healthy`:     the probe connection succeeds
//! - `Probing` → `CoolingDown`: the probe connection fails

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Endpoint health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Eligible for selection.
    Healthy,
    /// Skipped by the pool until the cool-down elapses.
    CoolingDown,
    /// One attempt allowed to test whether the endpoint recovered.
    Probing,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::CoolingDown => write!(f, "cooling-down"),
            Self::Probing => write!(f, "probing"),
        }
    }
}

/// Health tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures before the endpoint cools down.
    pub failure_threshold: u32,
    /// How long a cooling-down endpoint is skipped, in seconds.
    pub cooldown_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

impl HealthConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

struct HealthInner {
    state: HealthState,
    consecutive_failures: u32,
    cooling_since: Option<Instant>,
}

/// Thread-safe health tracker for one endpoint.
#[derive(Clone)]
pub struct EndpointHealth {
    config: HealthConfig,
    inner: Arc<Mutex<HealthInner>>,
}

impl EndpointHealth {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(HealthInner {
                state: HealthState::Healthy,
                consecutive_failures: 0,
                cooling_since: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HealthInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state, moving `CoolingDown` → `Probing` once the window has passed.
    pub fn state(&self) -> HealthState {
        let mut inner = self.lock();
        if inner.state == HealthState::CoolingDown {
            if let Some(since) = inner.cooling_since {
                if since.elapsed() >= self.config.cooldown() {
                    inner.state = HealthState::Probing;
                    tracing::debug!("endpoint cool-down elapsed, probing");
                }
            }
        }
        inner.state
    }

    /// Returns `true` if the pool may hand this endpoint out.
    pub fn is_available(&self) -> bool {
        self.state() != HealthState::CoolingDown
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.state = HealthState::Healthy;
        inner.consecutive_failures = 0;
        inner.cooling_since = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            HealthState::Healthy => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = HealthState::CoolingDown;
                    inner.cooling_since = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "endpoint cooling down"
                    );
                }
            }
            HealthState::Probing => {
                inner.state = HealthState::CoolingDown;
                inner.cooling_since = Some(Instant::now());
                tracing::warn!("endpoint probe failed, cooling down again");
            }
            HealthState::CoolingDown => {}
        }
    }
}

impl std::fmt::Debug for EndpointHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointHealth")
            .field("state", &self.state())
            .finish()
    }
}
