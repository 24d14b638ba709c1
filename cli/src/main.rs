//! chaintip: follow a chain tip, persist block headers, serve them.
//!
//! ```text
//! chaintip [--config chaintip.toml] [--database-url URL] [run]
//! chaintip check        # probe every configured endpoint once
//! ```

mod config;
mod logging;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chaintip_core::{
    BlockPublisher, ChainClient, ChainConnector, EndpointPool, FilterSource, IngestPipeline,
    PollingSource, RestartPolicy, Supervisor, SupervisorHandle, TipFollower, TransportMode,
};
use chaintip_rpc::{HttpConnector, WsConnector};
use chaintip_server::AppState;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "chaintip", version, about = "Chain tip follower and block header API")]
pub struct Cli {
    /// TOML config file
    #[arg(long, short, env = "CHAINTIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Block store: sqlite:<path>, postgres://..., or memory
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// HTTP listen address
    #[arg(long, env = "CHAINTIP_LISTEN")]
    pub listen: Option<String>,

    /// Subscription (WebSocket) endpoint; repeat to list several in priority order
    #[arg(long)]
    pub subscription_endpoint: Vec<String>,

    /// Polling (HTTP) endpoint; repeat to list several in priority order
    #[arg(long)]
    pub polling_endpoint: Vec<String>,

    /// Global log level
    #[arg(long, env = "CHAINTIP_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Follow the chain and serve the API (default)
    Run,
    /// Connect to every configured endpoint once and report its height
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli);
    logging::init_tracing(&config.log);
    config.follower.validate()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Check => check(config).await,
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let follower_cfg = &config.follower;
    info!(
        subscription = follower_cfg.subscription_endpoints.len(),
        polling = follower_cfg.polling_endpoints.len(),
        database = %chaintip_storage::redact(&config.database_url),
        "starting chaintip"
    );

    let store = chaintip_storage::open(&config.database_url).await?;
    let pipeline = IngestPipeline::new(
        store.clone(),
        BlockPublisher::new(follower_cfg.channel_capacity),
        follower_cfg.gap_window,
    );
    let pool = Arc::new(follower_cfg.build_pool());
    let follower = Arc::new(TipFollower::new(
        pool.clone(),
        Arc::new(FilterSource::new(WsConnector::default(), follower_cfg.filter_interval())),
        Arc::new(PollingSource::new(HttpConnector::default(), follower_cfg.poll_interval())),
        pipeline.clone(),
    ));

    let cancel = CancellationToken::new();
    let listener = TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    let state = AppState::new(pipeline, pool, &config.server.project_name, cancel.clone());
    let app = chaintip_server::router(state, &config.server.api_prefix);
    let mut server = tokio::spawn(chaintip_server::serve(listener, app, cancel.clone()));

    let mut ingestion = Supervisor::spawn(
        follower,
        RestartPolicy::from(&follower_cfg.restart),
        cancel.child_token(),
    );

    let cause = wait_for_stop(tokio::signal::ctrl_c(), &mut ingestion, &mut server).await;

    cancel.cancel();
    let ingest_result = ingestion.shutdown(follower_cfg.shutdown_grace()).await;
    let server_result = match cause {
        StopCause::ServerEnded(result) => result,
        _ => server.await,
    };
    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "HTTP server error"),
        Err(e) => warn!(error = %e, "HTTP server task failed"),
    }
    store.close().await;
    info!("chaintip stopped");

    ingest_result.context("ingestion failed")
}

/// What ended the main wait in [`run`].
#[derive(Debug)]
enum StopCause {
    Signal,
    IngestionEnded,
    ServerEnded(Result<std::io::Result<()>, JoinError>),
}

/// Wait until a shutdown signal arrives or either long-running task ends.
async fn wait_for_stop(
    signal: impl Future<Output = std::io::Result<()>>,
    ingestion: &mut SupervisorHandle,
    server: &mut JoinHandle<std::io::Result<()>>,
) -> StopCause {
    tokio::select! {
        signal = signal => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for ctrl-c, shutting down");
            }
            info!("shutdown requested");
            StopCause::Signal
        }
        _ = ingestion.stopped() => {
            error!("ingestion stopped, shutting down");
            StopCause::IngestionEnded
        }
        result = server => {
            error!("HTTP server stopped, shutting down");
            StopCause::ServerEnded(result)
        }
    }
}

async fn check(config: AppConfig) -> anyhow::Result<()> {
    let pool: EndpointPool = config.follower.build_pool();
    let ws = WsConnector::default();
    let http = HttpConnector::default();
    let mut reachable = 0usize;

    pool.begin_cycle();
    for mode in [TransportMode::Subscription, TransportMode::Polling] {
        while let Some(endpoint) = pool.next(mode) {
            let start = Instant::now();
            let height = match mode {
                TransportMode::Subscription => probe(&ws, &endpoint).await,
                TransportMode::Polling => probe(&http, &endpoint).await,
            };
            let ms = start.elapsed().as_millis();
            let label = mode.to_string();
            match height {
                Ok(h) => {
                    reachable += 1;
                    println!("ok    {label:<12} {:<60} block {h} ({ms} ms)", endpoint.url);
                }
                Err(e) => println!("fail  {label:<12} {:<60} {e}", endpoint.url),
            }
        }
    }

    if reachable == 0 {
        anyhow::bail!("no configured endpoint is reachable");
    }
    Ok(())
}

async fn probe<C: ChainConnector>(
    connector: &C,
    endpoint: &chaintip_core::EndpointHandle,
) -> Result<u64, chaintip_core::TipError> {
    let client = connector.connect(endpoint).await?;
    client.block_number().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chaintip_core::{HealthConfig, MemoryBlockStore};

    /// Supervisor over an empty pool: every cycle fails and waits out a long
    /// backoff, so the task stays alive.
    fn idle_ingestion() -> SupervisorHandle {
        let pool = Arc::new(EndpointPool::new(
            Vec::<String>::new(),
            Vec::<String>::new(),
            HealthConfig::default(),
        ));
        let pipeline = IngestPipeline::new(
            Arc::new(MemoryBlockStore::new()),
            BlockPublisher::new(4),
            Some(0),
        );
        let follower = Arc::new(TipFollower::new(
            pool,
            Arc::new(FilterSource::new(WsConnector::default(), Duration::from_secs(1))),
            Arc::new(PollingSource::new(HttpConnector::default(), Duration::from_secs(1))),
            pipeline,
        ));
        Supervisor::spawn(follower, RestartPolicy::default(), CancellationToken::new())
    }

    #[tokio::test]
    async fn server_failure_ends_wait() {
        let mut ingestion = idle_ingestion();
        let mut server = tokio::spawn(async {
            Err::<(), _>(std::io::Error::other("listener closed"))
        });

        let cause = wait_for_stop(std::future::pending(), &mut ingestion, &mut server).await;
        assert!(matches!(cause, StopCause::ServerEnded(Ok(Err(_)))));
        ingestion.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn signal_ends_wait() {
        let mut ingestion = idle_ingestion();
        let mut server = tokio::spawn(std::future::pending::<std::io::Result<()>>());

        let cause = wait_for_stop(async { Ok(()) }, &mut ingestion, &mut server).await;
        assert!(matches!(cause, StopCause::Signal));
        assert!(!server.is_finished());
        server.abort();
        ingestion.shutdown(Duration::from_secs(1)).await.unwrap();
    }
}
