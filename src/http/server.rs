//! HTTP server: accept loop, connection driving and draining.
//!
//! # Responsibilities
//! - Accept connections through the bounded [`Listener`]
//! - Serve HTTP/1.1 and HTTP/2 on each connection (hyper-util auto builder)
//! - Close the transport without writing when a response is tagged
//!   [`AbortConnection`]
//! - On shutdown: stop accepting, let in-flight requests finish, and abort
//!   whatever is still running when the drain window closes
//!
//! # Shutdown Sequence
//! ```text
//! ShutdownSignal fires
//!     → accept loop exits, listener dropped (new connects are refused)
//!     → every connection gets a graceful-shutdown notice
//!     → wait up to drain_timeout for them to finish
//!     → still running? abort their tasks → DeadlineExceeded
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::task::JoinSet;
use tower::ServiceExt;

use crate::http::error::{AbortConnection, ConnectionAborted};
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionTracker, Listener, ListenerError};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How the server finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Every connection finished inside the drain window.
    Drained,
    /// The drain window closed first; `abandoned` connections were aborted.
    DeadlineExceeded { abandoned: u64 },
}

/// HTTP server bound to an assembled pipeline.
pub struct HttpServer {
    router: Router,
    drain_timeout: Duration,
}

impl HttpServer {
    pub fn new(router: Router, drain_timeout: Duration) -> Self {
        Self {
            router,
            drain_timeout,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Serve until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, mut shutdown: ShutdownSignal) -> ServeOutcome {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "HTTP server starting"),
            Err(e) => tracing::warn!(error = %e, "HTTP server starting, local address unknown"),
        }

        let builder = Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let tracker = ConnectionTracker::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = tracker.track();
                        let router = self.router.clone();
                        let service = service_fn(move |request: hyper::Request<Incoming>| {
                            let mut request = request.map(Body::new);
                            request.extensions_mut().insert(ConnectInfo(peer));
                            let router = router.clone();
                            async move {
                                let response = match router.oneshot(request).await {
                                    Ok(response) => response,
                                    Err(never) => match never {},
                                };
                                // hyper drops the connection on a service error
                                if response.extensions().get::<AbortConnection>().is_some() {
                                    return Err(ConnectionAborted);
                                }
                                Ok(response)
                            }
                        });
                        let conn = builder
                            .serve_connection_with_upgrades(TokioIo::new(stream), service)
                            .into_owned();
                        let conn = graceful.watch(conn);

                        connections.spawn(async move {
                            let _permit = permit;
                            if let Err(e) = conn.await {
                                tracing::debug!(
                                    connection_id = %guard.id(),
                                    peer_addr = %peer,
                                    error = %e,
                                    "Connection ended with error"
                                );
                            }
                        });
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }

            while connections.try_join_next().is_some() {}
        }

        drop(listener);
        tracing::info!(
            in_flight = tracker.active_count(),
            timeout_secs = self.drain_timeout.as_secs_f64(),
            "Stopped accepting, draining connections"
        );

        match tokio::time::timeout(self.drain_timeout, graceful.shutdown()).await {
            Ok(()) => {
                while connections.join_next().await.is_some() {}
                tracing::info!("HTTP server stopped");
                ServeOutcome::Drained
            }
            Err(_) => {
                let abandoned = tracker.active_count();
                connections.abort_all();
                while connections.join_next().await.is_some() {}
                tracing::warn!(abandoned, "Drain window closed, connections aborted");
                ServeOutcome::DeadlineExceeded { abandoned }
            }
        }
    }
}
