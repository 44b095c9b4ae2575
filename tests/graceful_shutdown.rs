//! Draining behaviour of the HTTP server.

use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use service_harness::http::ServeOutcome;

mod common;
use common::TestServer;

fn slow_routes() -> Router {
    Router::new()
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                "done"
            }),
        )
        .route(
            "/stuck",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "never"
            }),
        )
}

#[tokio::test]
async fn in_flight_request_completes_before_stop() {
    let server = TestServer::start(slow_routes(), Duration::from_secs(5)).await;
    let url = server.url("/slow");

    let started = Instant::now();
    let request = tokio::spawn(async move { reqwest::get(url).await?.text().await });
    // let the request reach the handler
    tokio::time::sleep(Duration::from_millis(200)).await;

    let addr = server.addr;
    let outcome = server.stop().await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, ServeOutcome::Drained);
    assert_eq!(request.await.unwrap().unwrap(), "done");
    assert!(elapsed >= Duration::from_secs(1), "stopped after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "stopped after {elapsed:?}");
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn deadline_aborts_stuck_request() {
    let server = TestServer::start(slow_routes(), Duration::from_millis(300)).await;
    let url = server.url("/stuck");

    let request = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let outcome = server.stop().await;

    assert_eq!(outcome, ServeOutcome::DeadlineExceeded { abandoned: 1 });
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(request.await.unwrap().is_err(), "client sees the forced close");
}
