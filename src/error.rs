//! Adapter error types.

use thiserror::Error;

/// Errors raised while building a request from the environment.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("missing environment field: {0}")]
    MissingField(&'static str),

    #[error("invalid request method: {0:?}")]
    InvalidMethod(String),

    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end an invocation without a response being delivered
/// the normal way.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("request construction failed: {0}")]
    Request(#[from] RequestError),

    #[error("failed to write response: {0}")]
    Output(#[from] std::io::Error),
}

pub type InvocationResult<T> = Result<T, InvocationError>;
