// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

use thiserror::Error;

/// Errors from the PostgreSQL stores
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("PostgreSQL connection error: {0}")]
    ConnectionError(String),

    #[error("PostgreSQL query error: {0}")]
    QueryError(String),

    #[error("Unreadable row: {0}")]
    InvalidRow(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        StoreError::QueryError(err.to_string())
    }
}

impl From<StoreError> for pulsestream::Error {
    fn from(err: StoreError) -> Self {
        pulsestream::Error::Store(err.to_string())
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
