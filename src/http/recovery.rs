//! Panic recovery interceptor.
//!
//! # Responsibilities
//! - Run the inner chain inside a per-request unwind boundary
//! - Tell a dead client connection apart from a genuine fault
//! - Log the request (request line and headers, no body) with the panic
//!
//! # Outcomes
//! ```text
//! panic payload is a reset / broken pipe
//!     → error log, response tagged AbortConnection (nothing is written)
//! any other panic
//!     → "[Recovery from panic]" error log (+ backtrace), bare 500
//! ```
//!
//! # Design Decisions
//! - Handlers report expected failures as `AppError`; only unexpected
//!   panics reach this layer
//! - The backtrace is captured by a panic hook on the panicking thread and
//!   picked up after unwinding; panics outside a boundary go to the
//!   previous hook untouched

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;

use crate::http::error::{AbortConnection, HandlerErrors};

thread_local! {
    // Some(capture_stack) while a boundary is being polled on this thread.
    static BOUNDARY: Cell<Option<bool>> = const { Cell::new(None) };
    static LAST_PANIC: RefCell<Option<PanicCapture>> = const { RefCell::new(None) };
}

#[derive(Debug, Default)]
struct PanicCapture {
    location: Option<String>,
    backtrace: Option<String>,
}

/// Settings for the recovery middleware.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryConfig {
    capture_stack: bool,
}

impl RecoveryConfig {
    /// Installs the process panic hook on first use.
    pub fn new(capture_stack: bool) -> Self {
        install_panic_hook();
        Self { capture_stack }
    }

    pub fn capture_stack(&self) -> bool {
        self.capture_stack
    }
}

/// Axum middleware: `middleware::from_fn_with_state(RecoveryConfig::new(true), recover)`.
pub async fn recover(State(config): State<RecoveryConfig>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let dump = dump_request(&request);

    let guarded = Boundary {
        inner: Box::pin(AssertUnwindSafe(next.run(request)).catch_unwind()),
        capture_stack: config.capture_stack,
    };

    match guarded.await {
        Ok(response) => response,
        Err(payload) => recovered_response(config, &path, &dump, payload.as_ref()),
    }
}

fn recovered_response(
    config: RecoveryConfig,
    path: &str,
    dump: &str,
    payload: &(dyn Any + Send),
) -> Response {
    let capture = LAST_PANIC.with(|slot| slot.borrow_mut().take()).unwrap_or_default();
    let error = panic_message(payload);

    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response
        .extensions_mut()
        .insert(HandlerErrors::single(error.clone()));

    if is_broken_connection(payload) {
        tracing::error!(error = %error, request = %dump, "{}", path);
        response.extensions_mut().insert(AbortConnection);
        return response;
    }

    let location = capture.location.unwrap_or_default();
    if config.capture_stack {
        let stack = capture.backtrace.unwrap_or_default();
        tracing::error!(
            error = %error,
            location = %location,
            request = %dump,
            stack = %stack,
            "[Recovery from panic]"
        );
    } else {
        tracing::error!(
            error = %error,
            location = %location,
            request = %dump,
            "[Recovery from panic]"
        );
    }
    response
}

/// Whether a panic payload means the peer already hung up.
pub fn is_broken_connection(payload: &(dyn Any + Send)) -> bool {
    if let Some(err) = payload.downcast_ref::<io::Error>() {
        return matches!(
            err.kind(),
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
        ) || mentions_broken_connection(&err.to_string());
    }
    panic_text(payload).is_some_and(mentions_broken_connection)
}

fn mentions_broken_connection(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("broken pipe") || text.contains("connection reset by peer")
}

fn panic_text(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

/// Human-readable panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = panic_text(payload) {
        return text.to_string();
    }
    if let Some(err) = payload.downcast_ref::<io::Error>() {
        return err.to_string();
    }
    "non-string panic payload".to_string()
}

/// Request line and headers, HTTP/1 style. The body is never read.
pub fn dump_request(request: &Request) -> String {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut dump = format!("{} {} {:?}\r\n", request.method(), target, request.version());
    for (name, value) in request.headers() {
        dump.push_str(name.as_str());
        dump.push_str(": ");
        dump.push_str(&String::from_utf8_lossy(value.as_bytes()));
        dump.push_str("\r\n");
    }
    dump.push_str("\r\n");
    dump
}

fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| match BOUNDARY.with(Cell::get) {
            Some(capture_stack) => {
                let capture = PanicCapture {
                    location: info.location().map(ToString::to_string),
                    backtrace: capture_stack.then(|| Backtrace::force_capture().to_string()),
                };
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(capture));
            }
            None => previous(info),
        }));
    });
}

/// Marks the thread as inside a recovery boundary for each poll.
struct Boundary<F> {
    inner: Pin<Box<F>>,
    capture_stack: bool,
}

impl<F: Future> Future for Boundary<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outer = BOUNDARY.with(|b| b.replace(Some(self.capture_stack)));
        let result = self.inner.as_mut().poll(cx);
        BOUNDARY.with(|b| b.set(outer));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::capture;
    use axum::body::Body;
    use axum::http;
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    fn app(capture_stack: bool) -> Router {
        Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route(
                "/fault",
                get(|| async {
                    if true {
                        panic!("index out of range");
                    }
                    "unreachable"
                }),
            )
            .route(
                "/gone",
                get(|| async {
                    if true {
                        panic::panic_any(io::Error::from(io::ErrorKind::BrokenPipe));
                    }
                    "unreachable"
                }),
            )
            .layer(middleware::from_fn_with_state(RecoveryConfig::new(capture_stack), recover))
    }

    fn get_request(uri: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .header("host", "svc.local")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn fault_becomes_bare_500_with_stack() {
        let (sink, logs) = capture::sink("info");
        let _guard = tracing::dispatcher::set_default(sink.dispatch());

        let response = app(true).oneshot(get_request("/fault?x=1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<AbortConnection>().is_none());
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(body.is_empty());

        let lines = logs.lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "ERROR");
        assert_eq!(line["msg"], "[Recovery from panic]");
        assert_eq!(line["error"], "index out of range");
        assert!(line["request"].as_str().unwrap().starts_with("GET /fault?x=1 HTTP/1.1\r\n"));
        assert!(line["request"].as_str().unwrap().contains("host: svc.local\r\n"));
        assert!(line["location"].as_str().unwrap().contains("recovery.rs"));
        assert!(!line["stack"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stack_is_omitted_when_disabled() {
        let (sink, logs) = capture::sink("info");
        let _guard = tracing::dispatcher::set_default(sink.dispatch());

        app(false).oneshot(get_request("/fault")).await.unwrap();

        let lines = logs.lines();
        assert!(lines[0].get("stack").is_none());
    }

    #[tokio::test]
    async fn broken_pipe_is_marked_for_abort() {
        let (sink, logs) = capture::sink("info");
        let _guard = tracing::dispatcher::set_default(sink.dispatch());

        let response = app(true).oneshot(get_request("/gone")).await.unwrap();
        assert!(response.extensions().get::<AbortConnection>().is_some());

        let lines = logs.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["msg"], "/gone");
        assert!(lines[0].get("stack").is_none());
    }

    #[tokio::test]
    async fn next_request_is_unaffected() {
        let app = app(true);
        app.clone().oneshot(get_request("/fault")).await.unwrap();
        let response = app.oneshot(get_request("/ok")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn classifies_payloads() {
        let reset: Box<dyn Any + Send> = Box::new(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(is_broken_connection(reset.as_ref()));

        let text: Box<dyn Any + Send> = Box::new(String::from("write: Connection reset by peer"));
        assert!(is_broken_connection(text.as_ref()));

        let fault: Box<dyn Any + Send> = Box::new("attempt to divide by zero");
        assert!(!is_broken_connection(fault.as_ref()));
        assert_eq!(panic_message(fault.as_ref()), "attempt to divide by zero");

        let opaque: Box<dyn Any + Send> = Box::new(42u32);
        assert!(!is_broken_connection(opaque.as_ref()));
        assert_eq!(panic_message(opaque.as_ref()), "non-string panic payload");
    }
}
