//! Startup and shutdown orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize subsystems in dependency order
//! - Start the config watcher
//! - Bind the listener and begin accepting traffic
//! - Tear everything down in reverse order within a bounded window
//!
//! # Design Decisions
//! - Fail fast: config, logger and listener errors are fatal
//! - Store failures are fatal only with `server.require_stores`
//! - Listener starts last (traffic only when ready)
//! - The log sink is dropped last so teardown is still recorded

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::task::{JoinError, JoinHandle};

use crate::config::{AppConfig, ConfigError, ConfigStore, WatchHandle};
use crate::http::pipeline;
use crate::http::server::{HttpServer, ServeOutcome};
use crate::http::state::AppState;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::{Lifecycle, LifecycleState, TransitionError};
use crate::net::{Listener, ListenerError};
use crate::observability::{LogError, LogSink};
use crate::routes;
use crate::store::{StoreError, StorePools};

/// Anything that stops the process from starting or stopping cleanly.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("init settings failed: {0}")]
    Config(#[from] ConfigError),

    #[error("init logger failed: {0}")]
    Log(#[from] LogError),

    #[error("init store failed: {0}")]
    Store(#[from] StoreError),

    #[error("listen failed: {0}")]
    Listen(#[from] ListenerError),

    #[error("server shutdown exceeded {timeout:?}, {abandoned} connection(s) aborted")]
    ShutdownDeadline { timeout: Duration, abandoned: u64 },

    #[error("server task failed: {0}")]
    Server(#[from] JoinError),

    #[error(transparent)]
    Lifecycle(#[from] TransitionError),
}

/// A process between configuration and serving.
pub struct Harness {
    lifecycle: Lifecycle,
    config: Arc<ConfigStore>,
    stores: StorePools,
    watcher: Option<WatchHandle>,
    // Declared last: dropped after everything above has logged its teardown.
    _sink: LogSink,
}

impl Harness {
    /// Load configuration, bring up logging and start watching the config file.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn bootstrap(path: Option<&Path>) -> Result<Self, HarnessError> {
        let mut lifecycle = Lifecycle::new();

        let config = Arc::new(ConfigStore::load(path)?);
        lifecycle.advance(LifecycleState::ConfigLoaded)?;

        let snapshot = config.snapshot();
        let sink = LogSink::init(&snapshot.log, snapshot.mode)?;
        if !sink.install() {
            eprintln!("a global log dispatcher is already installed; keeping it");
        }
        lifecycle.advance(LifecycleState::LoggingReady)?;

        tracing::info!(
            name = %snapshot.name,
            version = %snapshot.version,
            mode = %snapshot.mode,
            port = snapshot.port,
            path = %config.path().display(),
            "Configuration loaded"
        );

        let watcher = match config.watch(|next| {
            tracing::info!(
                port = next.port,
                level = %next.log.level,
                "New configuration active; port and log changes apply on restart"
            );
        }) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher not started, hot reload disabled");
                None
            }
        };

        Ok(Self {
            lifecycle,
            config,
            stores: StorePools::default(),
            watcher,
            _sink: sink,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn stores(&self) -> &StorePools {
        &self.stores
    }

    /// Open the MySQL and Redis pools.
    pub async fn open_resources(&mut self) -> Result<(), HarnessError> {
        let snapshot = self.config.snapshot();
        let (stores, failures) = StorePools::open(&snapshot).await;

        if snapshot.server.require_stores {
            if let Some(first) = failures.into_iter().next() {
                stores.close().await;
                return Err(first.into());
            }
        }

        self.stores = stores;
        self.lifecycle.advance(LifecycleState::ResourcesOpened)?;
        Ok(())
    }

    /// Assemble the pipeline around `routes`, bind the port and start serving.
    ///
    /// The state becomes `Serving` only once the server task is running.
    pub async fn start<F>(mut self, build_routes: F) -> Result<Serving, HarnessError>
    where
        F: FnOnce(AppState) -> Router,
    {
        self.lifecycle.check(LifecycleState::Serving)?;

        let snapshot = self.config.snapshot();
        let state = AppState::new(Arc::clone(&self.config), self.stores.clone());
        let router = pipeline::assemble(build_routes(state), snapshot.server.capture_stack);

        let addr = SocketAddr::from(([0, 0, 0, 0], snapshot.port));
        let listener = match Listener::bind(addr, snapshot.server.max_connections).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, "listen failed");
                self.stores.close().await;
                return Err(e.into());
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let drain_timeout = Duration::from_secs(snapshot.server.shutdown_timeout_secs);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(HttpServer::new(router, drain_timeout).run(listener, shutdown.subscribe()));
        self.lifecycle.advance(LifecycleState::Serving)?;

        tracing::info!(address = %local_addr, "Serving");
        Ok(Serving {
            harness: self,
            shutdown,
            task,
            local_addr,
            drain_timeout,
        })
    }
}

/// A running server.
pub struct Serving {
    harness: Harness,
    shutdown: Shutdown,
    task: JoinHandle<ServeOutcome>,
    local_addr: SocketAddr,
    drain_timeout: Duration,
}

impl Serving {
    /// Bound address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        self.harness.state()
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.harness.config.snapshot()
    }

    /// Drain, close stores and flush logs.
    pub async fn stop(self) -> Result<(), HarnessError> {
        let Serving {
            mut harness,
            shutdown,
            task,
            drain_timeout,
            ..
        } = self;

        harness.lifecycle.advance(LifecycleState::Draining)?;
        tracing::info!("Shutting down server...");
        shutdown.trigger();

        let outcome = task.await;

        harness.stores.close().await;
        drop(harness.watcher.take());
        harness.lifecycle.advance(LifecycleState::Stopped)?;

        let result = match outcome {
            Ok(ServeOutcome::Drained) => {
                tracing::info!("Server exiting");
                Ok(())
            }
            Ok(ServeOutcome::DeadlineExceeded { abandoned }) => {
                tracing::error!(
                    fatal = true,
                    abandoned,
                    timeout_secs = drain_timeout.as_secs_f64(),
                    "Server Shutdown"
                );
                Err(HarnessError::ShutdownDeadline {
                    timeout: drain_timeout,
                    abandoned,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "Server task failed");
                Err(e.into())
            }
        };

        // Flushes the log sink.
        drop(harness);
        result
    }
}

/// Run the whole lifecycle with the default routes, stopping when `signal` resolves.
pub async fn run<S>(path: Option<&Path>, signal: S) -> Result<(), HarnessError>
where
    S: Future<Output = ()>,
{
    let mut harness = Harness::bootstrap(path)?;
    harness.open_resources().await?;
    let serving = harness.start(routes::setup_router).await?;

    signal.await;
    serving.stop().await
}
