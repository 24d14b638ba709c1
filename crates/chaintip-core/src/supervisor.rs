//! Supervised ingestion task.
//!
//! Runs [`TipFollower::run_cycle`] in a loop, sleeping an exponential
//! backoff between exhausted cycles. The backoff resets once a cycle stores
//! at least one block.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::error::TipError;
use crate::follower::TipFollower;

/// Default grace period granted to the ingestion task on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Restart policy for exhausted cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    pub backoff: BackoffConfig,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig {
                max_retries: None,
                initial: Duration::from_secs(5),
                max: Duration::from_secs(300),
                multiplier: 2.0,
            },
        }
    }
}

pub struct Supervisor;

impl Supervisor {
    /// Spawn the ingestion task on the current runtime.
    pub fn spawn(
        follower: Arc<TipFollower>,
        policy: RestartPolicy,
        cancel: CancellationToken,
    ) -> SupervisorHandle {
        let task = tokio::spawn(supervise(follower, policy, cancel.clone()));
        SupervisorHandle {
            cancel,
            task,
            outcome: None,
        }
    }
}

async fn supervise(
    follower: Arc<TipFollower>,
    policy: RestartPolicy,
    cancel: CancellationToken,
) -> Result<(), TipError> {
    let backoff = Backoff::new(policy.backoff);
    let mut attempt = 0u32;
    loop {
        let stored_before = follower.pipeline().stats().stored;
        let result = follower.run_cycle(&cancel).await;
        if cancel.is_cancelled() {
            info!("ingestion stopped");
            return Ok(());
        }
        let err = match result {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if follower.pipeline().stats().stored > stored_before {
            attempt = 0;
        }
        attempt += 1;
        let Some(delay) = backoff.next_delay(attempt) else {
            error!(restarts = attempt - 1, error = %err, "giving up on chain tip");
            return Err(err);
        };
        warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "endpoint cycle failed, restarting");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("ingestion stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Owner-side handle of the ingestion task.
pub struct SupervisorHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), TipError>>,
    outcome: Option<Result<(), TipError>>,
}

impl SupervisorHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || self.task.is_finished()
    }

    /// Wait for the task to end without consuming the handle. Cancel-safe,
    /// so it can be raced against a shutdown signal in `select!`.
    pub async fn stopped(&mut self) {
        if self.outcome.is_none() {
            let joined = (&mut self.task).await;
            self.outcome = Some(joined.unwrap_or_else(|e| Err(TipError::Task(e.to_string()))));
        }
    }

    /// Wait for the task to finish on its own.
    pub async fn join(mut self) -> Result<(), TipError> {
        self.stopped().await;
        self.outcome.take().unwrap_or(Ok(()))
    }

    /// Cancel the task and wait up to `grace` for it; abort it afterwards.
    pub async fn shutdown(mut self, grace: Duration) -> Result<(), TipError> {
        self.cancel.cancel();
        if tokio::time::timeout(grace, self.stopped()).await.is_ok() {
            return self.outcome.take().unwrap_or(Ok(()));
        }
        warn!(grace_secs = grace.as_secs(), "ingestion task did not stop in time, aborting");
        self.task.abort();
        Err(TipError::Task("shutdown grace period elapsed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthConfig;
    use crate::ingest::IngestPipeline;
    use crate::pool::EndpointPool;
    use crate::publisher::BlockPublisher;
    use crate::source::{FilterSource, PollingSource};
    use crate::store::MemoryBlockStore;
    use crate::test_utils::{FakeChain, FakeConnector};

    fn policy(max_restarts: Option<u32>) -> RestartPolicy {
        RestartPolicy {
            backoff: BackoffConfig {
                max_retries: max_restarts,
                initial: Duration::from_millis(1),
                max: Duration::from_millis(5),
                multiplier: 2.0,
            },
        }
    }

    fn follower(connector: FakeConnector, polling: &[&str], poll_ms: u64) -> Arc<TipFollower> {
        let pool = Arc::new(EndpointPool::new(
            Vec::<String>::new(),
            polling.iter().copied(),
            HealthConfig {
                failure_threshold: 100,
                cooldown_secs: 60,
            },
        ));
        let pipeline = IngestPipeline::new(
            Arc::new(MemoryBlockStore::new()),
            BlockPublisher::new(16),
            Some(0),
        );
        Arc::new(TipFollower::new(
            pool,
            Arc::new(FilterSource::new(connector.clone(), Duration::from_millis(1))),
            Arc::new(PollingSource::new(connector, Duration::from_millis(poll_ms))),
            pipeline,
        ))
    }

    #[tokio::test]
    async fn gives_up_after_max_restarts() {
        let connector = FakeConnector::new().with("https://p", FakeChain::unreachable());
        let f = follower(connector.clone(), &["https://p"], 1);
        let handle = Supervisor::spawn(f, policy(Some(2)), CancellationToken::new());

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, TipError::PoolExhausted));
        // initial cycle plus two restarts
        assert_eq!(connector.attempts().len(), 3);
    }

    #[tokio::test]
    async fn stored_blocks_reset_restart_budget() {
        // each connect sees the head advance once, then the script runs dry
        let connector = FakeConnector::new()
            .with("https://p", FakeChain::sessions([vec![1, 2], vec![2, 3], vec![3, 4]]));
        let f = follower(connector.clone(), &["https://p"], 1);
        let handle = Supervisor::spawn(f.clone(), policy(Some(1)), CancellationToken::new());

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, TipError::PoolExhausted));
        // three storing cycles, then one that stores nothing and exceeds the budget
        assert_eq!(connector.attempts().len(), 4);
        assert_eq!(f.pipeline().stats().stored, 3);
    }

    #[tokio::test]
    async fn shutdown_stops_idle_follower() {
        let connector = FakeConnector::new()
            .with("https://p", FakeChain::heads(std::iter::repeat(3).take(1_000)));
        let f = follower(connector, &["https://p"], 20);
        let handle = Supervisor::spawn(f, policy(None), CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        handle.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn stopped_is_cancel_safe() {
        let connector = FakeConnector::new().with("https://p", FakeChain::unreachable());
        let f = follower(connector, &["https://p"], 1);
        let mut handle = Supervisor::spawn(f, policy(Some(1)), CancellationToken::new());

        // a losing race leaves the handle usable
        tokio::select! {
            biased;
            _ = std::future::ready(()) => {}
            _ = handle.stopped() => {}
        }
        handle.stopped().await;
        assert!(handle.is_finished());
        assert!(matches!(handle.shutdown(Duration::from_secs(1)).await, Err(TipError::PoolExhausted)));
    }

    #[tokio::test]
    async fn external_cancel_ends_supervision() {
        let connector = FakeConnector::new().with("https://p", FakeChain::unreachable());
        let f = follower(connector, &["https://p"], 1);
        let cancel = CancellationToken::new();
        let handle = Supervisor::spawn(f, policy(None), cancel.clone());

        cancel.cancel();
        handle.join().await.unwrap();
    }
}
