// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Operation parameters outside their declared domain.
    /// Raised while building a sequence, never while reversing one.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation could not be applied to the given buffer
    /// (shape mismatch, truncated pixel data, corrupt stored sequence).
    #[error("application error: {0}")]
    Application(String),

    /// Canonical encoding or decoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl KernelError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        KernelError::Configuration(msg.into())
    }

    pub fn application(msg: impl Into<String>) -> Self {
        KernelError::Application(msg.into())
    }

    /// Re-labels a domain violation found on the verification path.
    ///
    /// A stored sequence that no longer validates is malformed data, not a
    /// configuration mistake, so it surfaces as an application error.
    pub fn into_application(self) -> Self {
        match self {
            KernelError::Configuration(msg) => KernelError::Application(msg),
            other => other,
        }
    }
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
pub type Result<T> = KernelResult<T>;
