//! chaintip-core: follow a blockchain's tip across unreliable endpoints.
//!
//! # Overview
//!
//! ```text
//!            ┌──────────── EndpointPool ────────────┐
//!            │ subscription urls → polling urls     │
//!            └──────────────────┬───────────────────┘
//!                               │ next(mode)
//!   Supervisor ──► TipFollower ─┴► BlockSource::open ──► BlockStream
//!                                                          │ RawBlock
//!                                                          ▼
//!                              IngestPipeline: floor → exists → insert
//!                                      │                    │
//!                                      ▼                    ▼
//!                               BlockPublisher          BlockStore
//!                              (broadcast fan-out)
//! ```
//!
//! - [`EndpointPool`]: two ordered endpoint lists with cool-down health
//! - [`source`]: subscription ([`FilterSource`]) and polling
//!   ([`PollingSource`]) block sources
//! - [`IngestPipeline`]: dedupe, normalize, persist, publish
//! - [`BlockStore`]: persistence seam; [`MemoryBlockStore`] lives here,
//!   SQL backends live in `chaintip-storage`
//! - [`BlockPublisher`]: non-blocking fan-out to live subscribers
//! - [`Supervisor`]: restarts exhausted cycles with exponential backoff

pub mod backoff;
pub mod config;
pub mod error;
pub mod follower;
pub mod health;
pub mod ingest;
pub mod pool;
pub mod publisher;
pub mod source;
pub mod store;
pub mod supervisor;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use backoff::{Backoff, BackoffConfig};
pub use config::{FollowerConfig, RestartConfig};
pub use error::TipError;
pub use follower::TipFollower;
pub use health::{EndpointHealth, HealthConfig, HealthState};
pub use ingest::{IngestOutcome, IngestPipeline, IngestStats, SkipReason};
pub use pool::{EndpointHandle, EndpointPool, EndpointStats, TransportMode};
pub use publisher::{BlockPublisher, BlockSubscription};
pub use source::{BlockSource, BlockStream, ChainClient, ChainConnector, FilterSource, PollingSource};
pub use store::{BlockStore, InsertOutcome, MemoryBlockStore};
pub use supervisor::{RestartPolicy, Supervisor, SupervisorHandle};
pub use types::{BlockRecord, RawBlock};
