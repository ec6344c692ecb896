// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use reverso_kernel::error::KernelError;

/// Persistence collaborator failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures crossing the service boundary. All of them are worth retrying
/// except [`TransportError::Rejected`]. `NotFound` is a data-availability
/// failure: the peer may not have the record yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("peer returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("peer rejected request: {0}")]
    Rejected(String),
    #[error("unknown to peer: {0}")]
    NotFound(String),
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected(_))
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("kernel error: {0}")]
    Kernel(KernelError),
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("transport error: {0}")]
    Transport(TransportError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::NotFound(_) | EngineError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            EngineError::InvalidInput(_)
            | EngineError::Config(_)
            | EngineError::Kernel(KernelError::Configuration(_)) => StatusCode::BAD_REQUEST,
            EngineError::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<KernelError> for EngineError {
    fn from(e: KernelError) -> Self {
        EngineError::Kernel(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Store(other),
        }
    }
}

impl From<TransportError> for EngineError {
    fn from(e: TransportError) -> Self {
        EngineError::Transport(e)
    }
}
