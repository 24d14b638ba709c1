//! Endpoint pool: ordered upstream candidates per transport mode.
//!
//! The pool never reorders endpoints: every cycle starts at the first listed
//! endpoint of each mode and walks forward, skipping endpoints that are
//! cooling down after repeated failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::health::{EndpointHealth, HealthConfig, HealthState};

/// How a block source talks to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Persistent connection; the endpoint reports new heads.
    Subscription,
    /// Stateless requests; the client compares heights on a timer.
    Polling,
}

impl TransportMode {
    fn index(self) -> usize {
        match self {
            Self::Subscription => 0,
            Self::Polling => 1,
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscription => write!(f, "subscription"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

/// A candidate handed out by [`EndpointPool::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHandle {
    pub url: String,
    pub mode: TransportMode,
    index: usize,
}

impl EndpointHandle {
    /// Position of the endpoint within its mode's list.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Per-endpoint counters, as returned by [`EndpointPool::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    pub url: String,
    pub mode: TransportMode,
    pub successes: u64,
    pub failures: u64,
    pub health: HealthState,
}

struct EndpointSlot {
    url: String,
    health: EndpointHealth,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl EndpointSlot {
    fn new(url: String, config: &HealthConfig) -> Self {
        Self {
            url,
            health: EndpointHealth::new(config.clone()),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

/// Two fixed, ordered endpoint lists with per-cycle cursors.
pub struct EndpointPool {
    lists: [Vec<EndpointSlot>; 2],
    cursors: Mutex<[usize; 2]>,
}

impl EndpointPool {
    pub fn new(
        subscription: impl IntoIterator<Item = impl Into<String>>,
        polling: impl IntoIterator<Item = impl Into<String>>,
        health: HealthConfig,
    ) -> Self {
        let build = |urls: Vec<String>| -> Vec<EndpointSlot> {
            urls.into_iter()
                .map(|u| EndpointSlot::new(u, &health))
                .collect()
        };
        Self {
            lists: [
                build(subscription.into_iter().map(Into::into).collect()),
                build(polling.into_iter().map(Into::into).collect()),
            ],
            cursors: Mutex::new([0, 0]),
        }
    }

    fn cursors(&self) -> MutexGuard<'_, [usize; 2]> {
        self.cursors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of endpoints configured for `mode`.
    pub fn len(&self, mode: TransportMode) -> usize {
        self.lists[mode.index()].len()
    }

    /// Returns `true` if neither mode has any endpoint.
    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }

    /// Start a fresh cycle: both modes restart at their first endpoint.
    pub fn begin_cycle(&self) {
        *self.cursors() = [0, 0];
    }

    /// Next candidate for `mode` in this cycle, or `None` once the list is
    /// exhausted.
    pub fn next(&self, mode: TransportMode) -> Option<EndpointHandle> {
        let list = &self.lists[mode.index()];
        let mut cursors = self.cursors();
        let cursor = &mut cursors[mode.index()];
        while *cursor < list.len() {
            let index = *cursor;
            *cursor += 1;
            let slot = &list[index];
            if slot.health.is_available() {
                return Some(EndpointHandle {
                    url: slot.url.clone(),
                    mode,
                    index,
                });
            }
            tracing::debug!(endpoint = %slot.url, %mode, "skipping endpoint in cool-down");
        }
        None
    }

    fn slot(&self, handle: &EndpointHandle) -> Option<&EndpointSlot> {
        self.lists[handle.mode.index()]
            .get(handle.index)
            .filter(|s| s.url == handle.url)
    }

    /// Record that `handle` produced a working connection.
    pub fn record_success(&self, handle: &EndpointHandle) {
        if let Some(slot) = self.slot(handle) {
            slot.successes.fetch_add(1, Ordering::Relaxed);
            slot.health.record_success();
        }
    }

    /// Record that `handle` failed (connect error or terminated stream).
    pub fn record_failure(&self, handle: &EndpointHandle) {
        if let Some(slot) = self.slot(handle) {
            slot.failures.fetch_add(1, Ordering::Relaxed);
            slot.health.record_failure();
        }
    }

    /// Summary of every endpoint, subscription endpoints first.
    pub fn stats(&self) -> Vec<EndpointStats> {
        [TransportMode::Subscription, TransportMode::Polling]
            .into_iter()
            .flat_map(|mode| {
                self.lists[mode.index()].iter().map(move |s| EndpointStats {
                    url: s.url.clone(),
                    mode,
                    successes: s.successes.load(Ordering::Relaxed),
                    failures: s.failures.load(Ordering::Relaxed),
                    health: s.health.state(),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for EndpointPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointPool")
            .field("subscription", &self.len(TransportMode::Subscription))
            .field("polling", &self.len(TransportMode::Polling))
            .finish()
    }
}
