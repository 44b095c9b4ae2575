//! Handler errors and the response annotations interceptors read.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Error type returned by business handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// A backing store needed by the handler never opened.
    #[error("{0} is not available")]
    Unavailable(&'static str),

    /// The client went away mid-response; nothing can be written.
    #[error("client connection lost: {0}")]
    ConnectionLost(#[source] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ConnectionLost(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Detail goes to the access log only; the body stays empty.
        let mut response = status.into_response();
        response
            .extensions_mut()
            .insert(HandlerErrors::single(self.to_string()));
        if matches!(self, AppError::ConnectionLost(_)) {
            response.extensions_mut().insert(AbortConnection);
        }
        response
    }
}

/// Error annotations attached to a response for the access log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerErrors(Vec<String>);

impl HandlerErrors {
    pub fn single(message: impl Into<String>) -> Self {
        Self(vec![message.into()])
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for HandlerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, message) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            f.write_str(message)?;
        }
        Ok(())
    }
}

/// Response marker: the transport is dead, close it without writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortConnection;

/// Returned to hyper in place of an aborted response.
#[derive(Debug, Error)]
#[error("connection aborted: client is gone")]
pub struct ConnectionAborted;
