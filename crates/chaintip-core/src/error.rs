//! Error types for the chain-tip follower.

use thiserror::Error;

/// Errors that can occur while following the chain tip.
#[derive(Debug, Clone, Error)]
pub enum TipError {
    /// Transport-level failure (socket, DNS, HTTP status, dropped connection).
    #[error("connection error on {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// The endpoint answered, but the answer was malformed or an RPC error.
    #[error("protocol error on {endpoint}: {reason}")]
    Protocol { endpoint: String, reason: String },

    /// A single block could not be fetched during a range catch-up.
    #[error("failed to fetch block {height}: {reason}")]
    BlockFetch { height: u64, reason: String },

    /// The store is unavailable or a write failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Both endpoint lists were tried and failed within one cycle.
    #[error("all endpoints exhausted")]
    PoolExhausted,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The supervised ingestion task panicked or was aborted.
    #[error("ingestion task failed: {0}")]
    Task(String),
}

impl TipError {
    /// Shorthand for a [`TipError::Connection`].
    pub fn connection(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a [`TipError::Protocol`].
    pub fn protocol(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Protocol {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the error should make the follower move on to the
    /// next endpoint.
    pub fn is_rotatable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Protocol { .. })
    }

    /// Returns `true` for transport-level failures only.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotatable_errors() {
        assert!(TipError::connection("wss://a", "refused").is_rotatable());
        assert!(TipError::protocol("wss://a", "bad json").is_rotatable());
        assert!(!TipError::Persistence("disk full".into()).is_rotatable());
        assert!(!TipError::PoolExhausted.is_rotatable());
    }

    #[test]
    fn display_includes_endpoint() {
        let e = TipError::connection("https://rpc.example", "timed out");
        assert_eq!(e.to_string(), "connection error on https://rpc.example: timed out");
    }
}
