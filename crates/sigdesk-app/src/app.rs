//! Application context and main loop.
//!
//! `AppContext` owns every long-running task:
//! - store consumer (single writer)
//! - socket event pump (socket events → ingestion adapter)
//! - Socket.IO connection with reconnect
//! - optional REST hydration (yields to anything the socket already delivered)
//! - optional dashboard server
//!
//! It is built once at startup and torn down explicitly.

use crate::config::AppConfig;
use crate::error::AppResult;
use sigdesk_api::{hydrate_store, ApiClient};
use sigdesk_dashboard::{run_server, DashboardState};
use sigdesk_feed::{
    run_event_pump, run_store_consumer, IngestStats, IngestionAdapter, LiveSignalStore,
    SignalUpdate, StoreReader,
};
use sigdesk_ws::{ConnectionManager, SocketEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long each task gets to finish after shutdown before it is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Periodic store summary interval.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// Running application components.
pub struct AppContext {
    config: AppConfig,
    shutdown_token: CancellationToken,
    reader: StoreReader,
    adapter: IngestionAdapter,
    connection: Arc<ConnectionManager>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl AppContext {
    /// Build every component and spawn its task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        // Fail before anything is spawned.
        let api_client = match (&config.api.base_url, config.api.hydrate_on_start) {
            (Some(base), true) => Some(ApiClient::new(base.clone())?),
            _ => None,
        };

        let shutdown_token = CancellationToken::new();
        let (update_tx, update_rx) = mpsc::channel::<SignalUpdate>(config.channel_capacity);
        let (event_tx, event_rx) = mpsc::channel::<SocketEvent>(config.channel_capacity);

        let (writer, reader) = LiveSignalStore::create(config.store.clone());
        let adapter = IngestionAdapter::new(update_tx);
        let connection = Arc::new(ConnectionManager::new(config.connection_config(), event_tx));

        let mut tasks = Vec::new();

        tasks.push((
            "store_consumer",
            tokio::spawn(run_store_consumer(writer, update_rx, shutdown_token.clone())),
        ));

        tasks.push((
            "event_pump",
            tokio::spawn(run_event_pump(
                adapter.clone(),
                event_rx,
                shutdown_token.clone(),
            )),
        ));

        let conn = connection.clone();
        tasks.push((
            "socket",
            tokio::spawn(async move {
                if let Err(e) = conn.connect().await {
                    error!(error = %e, "Socket connection gave up");
                }
            }),
        ));

        if let Some(client) = api_client {
            let adapter = adapter.clone();
            let token = shutdown_token.clone();
            tasks.push((
                "hydration",
                tokio::spawn(async move {
                    tokio::select! {
                        () = token.cancelled() => {}
                        report = hydrate_store(&client, &adapter) => {
                            if !report.is_complete() {
                                warn!(failed = ?report.failed, "Store partially hydrated");
                            }
                        }
                    }
                }),
            ));
        } else {
            info!("REST hydration disabled");
        }

        if config.dashboard.enabled {
            let state = DashboardState::new(reader.clone());
            let dashboard_config = config.dashboard.clone();
            let token = shutdown_token.clone();
            tasks.push((
                "dashboard",
                tokio::spawn(async move {
                    if let Err(e) = run_server(state, dashboard_config, token).await {
                        error!(error = %e, "Dashboard server failed");
                    }
                }),
            ));
        }

        info!(
            url = %config.websocket.url,
            namespace = connection.namespace(),
            tasks = tasks.len(),
            "Application context started"
        );

        Ok(Self {
            config,
            shutdown_token,
            reader,
            adapter,
            connection,
            tasks,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn reader(&self) -> &StoreReader {
        &self.reader
    }

    pub fn ingest_stats(&self) -> Arc<IngestStats> {
        self.adapter.stats()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(self) {
        info!("Shutting down application context");
        self.connection.shutdown();
        self.shutdown_token.cancel();

        for (name, mut handle) in self.tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "Task ended abnormally"),
                Err(_) => {
                    warn!(task = name, "Task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        let stats = self.adapter.stats();
        info!(
            revision = self.reader.revision(),
            ingested = stats.ingested(),
            dropped = stats.dropped(),
            "Application context stopped"
        );
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run until ctrl-c.
    pub async fn run(self) -> AppResult<()> {
        let context = AppContext::start(self.config)?;
        let token = context.shutdown_token();

        let mut summary_interval = tokio::time::interval(SUMMARY_INTERVAL);
        summary_interval.tick().await;

        info!("Entering main loop");
        loop {
            tokio::select! {
                _ = summary_interval.tick() => {
                    log_summary(&context);
                }
                () = token.cancelled() => {
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        context.shutdown().await;
        Ok(())
    }
}

fn log_summary(context: &AppContext) {
    let summary = context.reader().summary();
    let stats = context.ingest_stats();
    info!(
        revision = summary.revision,
        connection = ?summary.connection,
        regime = ?summary.regime,
        counts = ?summary.counts,
        ingested = stats.ingested(),
        dropped_unknown = stats.dropped_unknown(),
        dropped_malformed = stats.dropped_malformed(),
        reconnects = context.connection().reconnect_count(),
        "Store summary"
    );
}
