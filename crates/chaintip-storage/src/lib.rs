//! chaintip-storage: SQL backends for [`chaintip_core::BlockStore`].
//!
//! Backends:
//! - `memory`: [`chaintip_core::MemoryBlockStore`], no persistence
//! - [`sqlite`]: SQLite via `sqlx` (feature `sqlite`, on by default)
//! - [`postgres`]: PostgreSQL via `sqlx` (feature `postgres`)
//!
//! Every backend keeps one `block_headers` row per height and treats a
//! second insert for the same height as [`chaintip_core::InsertOutcome::AlreadyExists`].

use std::sync::Arc;

use chaintip_core::{BlockStore, MemoryBlockStore, TipError};

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresBlockStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBlockStore;

/// Open the store named by `url`.
///
/// `memory` selects the in-process store; `sqlite:` and `postgres://` /
/// `postgresql://` URLs select the SQL backends when their feature is on.
pub async fn open(url: &str) -> Result<Arc<dyn BlockStore>, TipError> {
    if url == "memory" || url == "memory://" {
        return Ok(Arc::new(MemoryBlockStore::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        if url.starts_with("sqlite:") {
            return Ok(Arc::new(SqliteBlockStore::open(url).await?));
        }
    }

    #[cfg(feature = "postgres")]
    {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Arc::new(PostgresBlockStore::connect(url).await?));
        }
    }

    Err(TipError::Config(format!(
        "unsupported database url {:?}",
        redact(url)
    )))
}

/// Strip credentials from a database URL for logs and errors.
pub fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
