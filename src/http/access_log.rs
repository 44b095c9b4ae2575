//! Access log interceptor.
//!
//! Wraps the rest of the chain and emits one info line per completed request.
//! It has to run after the handler: the status and elapsed time are only
//! known once the response exists.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::http::error::HandlerErrors;

/// What the access log records about one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub path: String,
    pub query: String,
    pub method: String,
    pub ip: String,
    pub user_agent: String,
    pub request_id: String,
}

impl RequestContext {
    /// Capture the request-side fields before the request is consumed.
    pub fn capture(request: &Request) -> Self {
        let headers = request.headers();
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            path: request.uri().path().to_string(),
            query: request.uri().query().unwrap_or_default().to_string(),
            method: request.method().to_string(),
            ip: client_ip(headers, peer),
            user_agent: header_str(headers, "user-agent"),
            request_id: header_str(headers, "x-request-id"),
        }
    }

    fn record(&self, response: &Response, cost: Duration) {
        let errors = response
            .extensions()
            .get::<HandlerErrors>()
            .map(ToString::to_string)
            .unwrap_or_default();

        tracing::info!(
            status = response.status().as_u16(),
            method = %self.method,
            path = %self.path,
            query = %self.query,
            ip = %self.ip,
            user_agent = %self.user_agent,
            request_id = %self.request_id,
            errors = %errors,
            cost = cost.as_secs_f64(),
            "{}",
            self.path
        );
    }
}

/// Axum middleware: `middleware::from_fn(access_log)`.
pub async fn access_log(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let context = RequestContext::capture(&request);

    let response = next.run(request).await;

    context.record(&response, start.elapsed());
    response
}

/// Client address as seen through proxies.
///
/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::AppError;
    use crate::observability::logging::capture;
    use axum::body::Body;
    use axum::http::{self, StatusCode};
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "Hello gin!" }))
            .route(
                "/broken",
                get(|| async { Err::<(), _>(AppError::Internal("db timeout".into())) }),
            )
            .layer(middleware::from_fn(access_log))
    }

    #[tokio::test]
    async fn one_line_per_request() {
        let (sink, logs) = capture::sink("debug");
        let _guard = tracing::dispatcher::set_default(sink.dispatch());

        let mut request = http::Request::builder()
            .uri("/?page=2")
            .header("user-agent", "curl/8.5.0")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5555))));

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let lines = logs.lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["msg"], "/");
        assert_eq!(line["method"], "GET");
        assert_eq!(line["path"], "/");
        assert_eq!(line["query"], "page=2");
        assert_eq!(line["status"], 200);
        assert_eq!(line["ip"], "10.0.0.7");
        assert_eq!(line["user_agent"], "curl/8.5.0");
        assert_eq!(line["errors"], "");
        assert!(line["cost"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn handler_errors_are_recorded() {
        let (sink, logs) = capture::sink("info");
        let _guard = tracing::dispatcher::set_default(sink.dispatch());

        let request = http::Request::builder().uri("/broken").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let lines = logs.lines();
        assert_eq!(lines[0]["status"], 500);
        assert_eq!(lines[0]["errors"], "db timeout");
    }

    #[test]
    fn forwarded_headers_win_over_peer() {
        let peer = Some(SocketAddr::from(([127, 0, 0, 1], 1)));
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer), "127.0.0.1");

        headers.insert("x-real-ip", "192.168.1.9".parse().unwrap());
        assert_eq!(client_ip(&headers, peer), "192.168.1.9");

        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, peer), "203.0.113.5");
    }
}
