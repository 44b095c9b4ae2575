//! Business routes.

use axum::routing::get;
use axum::Router;

use crate::http::state::AppState;

/// The service's routes, without interceptors (see [`crate::http::pipeline`]).
pub fn setup_router(state: AppState) -> Router {
    Router::new().route("/", get(index)).with_state(state)
}

async fn index() -> &'static str {
    "Hello gin!"
}
