//! Error type definitions for the catalog service
//!
//! This module defines the error types used by the store and the identicon
//! client. Process-level failures in `main` and configuration loading are
//! reported through `anyhow`.

use thiserror::Error;

/// Store specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The database could not be reached
    #[error("Database connection failed: {message}")]
    ConnectionFailed { message: String },

    /// A row with the same key already exists
    #[error("Duplicate {table} record: {message}")]
    UniqueViolation { table: String, message: String },

    /// Foreign key, not-null or check constraint failures
    #[error("Constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

/// Failures talking to the identicon generator
///
/// Every variant is transient from the backfill loop's point of view.
#[derive(Error, Debug)]
pub enum IdenticonError {
    /// Connection or protocol failure
    #[error("Transport error calling {url}: {message}")]
    Transport { url: String, message: String },

    /// The request did not complete within the configured timeout
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The generator answered with a non-success status
    #[error("Generator returned HTTP {status}")]
    Status { status: u16 },

    /// The response body could not be read
    #[error("Failed to read generator response body: {message}")]
    Body { message: String },

    /// The generator answered 200 with no image data
    #[error("Generator returned an empty image")]
    EmptyBody,
}

impl RepositoryError {
    /// Create a unique violation error
    pub fn unique_violation<T: Into<String>, M: Into<String>>(table: T, message: M) -> Self {
        Self::UniqueViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint_violation<C: Into<String>, M: Into<String>>(
        constraint: C,
        message: M,
    ) -> Self {
        Self::ConstraintViolation {
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    /// Whether the failure was caused by the data rather than the store
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UniqueViolation { .. } | Self::ConstraintViolation { .. }
        )
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(db_error) => {
                let table = db_error.table().unwrap_or("unknown").to_string();
                let constraint = db_error.constraint().unwrap_or("unknown").to_string();
                if db_error.is_unique_violation() {
                    Self::unique_violation(table, db_error.message())
                } else if db_error.is_foreign_key_violation()
                    || db_error.is_check_violation()
                {
                    Self::constraint_violation(constraint, db_error.message())
                } else {
                    Self::Database(sqlx::Error::Database(db_error))
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::ConnectionFailed {
                    message: error.to_string(),
                }
            }
            other => Self::Database(other),
        }
    }
}

impl IdenticonError {
    /// Classify a reqwest failure for the given endpoint
    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}
