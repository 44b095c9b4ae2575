//! Interceptor ordering around the business routes.
//!
//! ```text
//! request ──▶ request id ──▶ access log ──▶ recovery ──▶ handler
//! ```
//!
//! Recovery sits inside the access log so a recovered fault still produces
//! its access line with status 500.

use axum::middleware;
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::http::access_log::access_log;
use crate::http::recovery::{recover, RecoveryConfig};

/// Wrap `routes` with the standard interceptors.
pub fn assemble(routes: Router, capture_stack: bool) -> Router {
    routes
        .layer(middleware::from_fn_with_state(
            RecoveryConfig::new(capture_stack),
            recover,
        ))
        .layer(middleware::from_fn(access_log))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::capture;
    use axum::body::Body;
    use axum::http::{self, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    fn routes() -> Router {
        Router::new()
            .route("/", get(|| async { "Hello gin!" }))
            .route(
                "/fault",
                get(|| async {
                    if true {
                        panic!("nil map write");
                    }
                    "unreachable"
                }),
            )
    }

    #[tokio::test]
    async fn request_id_is_set_and_logged() {
        let (sink, logs) = capture::sink("info");
        let _guard = tracing::dispatcher::set_default(sink.dispatch());

        let response = assemble(routes(), false)
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(!id.is_empty());

        let lines = logs.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["request_id"], id.as_str());
    }

    #[tokio::test]
    async fn caller_request_id_is_kept() {
        let response = assemble(routes(), false)
            .oneshot(
                http::Request::builder()
                    .uri("/")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn recovered_fault_still_gets_access_line() {
        let (sink, logs) = capture::sink("info");
        let _guard = tracing::dispatcher::set_default(sink.dispatch());

        let app = assemble(routes(), true);
        let response = app
            .clone()
            .oneshot(http::Request::builder().uri("/fault").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = app
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let lines = logs.lines();
        let messages: Vec<_> = lines.iter().map(|l| l["msg"].as_str().unwrap().to_string()).collect();
        assert_eq!(messages, ["[Recovery from panic]", "/fault", "/"]);
        assert_eq!(lines[1]["status"], 500);
        assert_eq!(lines[1]["errors"], "nil map write");
        assert_eq!(lines[2]["status"], 200);
    }
}
