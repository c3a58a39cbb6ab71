//! Error types for store access and bucket clearing.

use std::fmt::Write;

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::clear::ClearResult;

/// Errors reported by an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store answered with an error response.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// The request never got a response (network, timeout, signing).
    #[error("transport failure: {0}")]
    Transport(String),

    /// Credentials or client settings were rejected before any request.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl<E, R> From<SdkError<E, R>> for StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    fn from(err: SdkError<E, R>) -> Self {
        match err.as_service_error() {
            Some(service) => StoreError::service(
                service.code().unwrap_or("Unknown"),
                service.message().unwrap_or_default(),
            ),
            None => StoreError::transport(DisplayErrorContext(&err).to_string()),
        }
    }
}

/// Errors returned by [`BulkDeleter::clear`](crate::clear::BulkDeleter::clear).
///
/// Every variant except `Session` carries the counts accumulated before the
/// operation stopped.
#[derive(Debug, thiserror::Error)]
pub enum ClearError {
    #[error("failed to open a session against {endpoint}: {source}")]
    Session {
        endpoint: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to list objects in {bucket} after deleting {}: {source}", .partial.deleted)]
    List {
        bucket: String,
        #[source]
        source: StoreError,
        partial: ClearResult,
    },

    #[error(
        "{} object(s) could not be deleted from {bucket} ({} deleted):{}",
        .result.failures.len(),
        .result.deleted,
        failure_lines(.result)
    )]
    Aggregate { bucket: String, result: ClearResult },

    #[error("clearing {bucket} was cancelled after deleting {}", .partial.deleted)]
    Cancelled { bucket: String, partial: ClearResult },
}

impl ClearError {
    /// The result accumulated before the error, if the error carries one.
    pub fn partial(&self) -> Option<&ClearResult> {
        match self {
            ClearError::Session { .. } => None,
            ClearError::List { partial, .. } | ClearError::Cancelled { partial, .. } => {
                Some(partial)
            }
            ClearError::Aggregate { result, .. } => Some(result),
        }
    }
}

fn failure_lines(result: &ClearResult) -> String {
    let mut out = String::new();
    for failure in &result.failures {
        let _ = write!(out, "\n  {}: {}", failure.key, failure.reason);
    }
    out
}
