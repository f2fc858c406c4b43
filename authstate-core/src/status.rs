//! Status values published to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session status as seen by presentation code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthStatus {
    /// No usable credentials.
    #[default]
    Unauthenticated,
    /// An authorization flow is in progress.
    Authenticating,
    /// A token refresh is in flight.
    Refreshing,
    /// A valid access token is available.
    Authorized {
        /// The current access token.
        access_token: String,
        /// When it expires.
        expires_at: DateTime<Utc>,
    },
    /// The last operation failed.
    Error {
        /// Failure class.
        kind: ErrorKind,
        /// Human readable message.
        message: String,
    },
}

impl AuthStatus {
    /// Build an error status.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Whether this status carries a usable access token.
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized { .. })
    }
}

/// Classification carried by [`AuthStatus::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Authorization was denied, cancelled, or rejected.
    Authorization,
    /// Issuer discovery failed.
    Discovery,
    /// Retryable network or server failure.
    Transient,
    /// The grant was revoked or expired.
    InvalidGrant,
    /// The client was rejected.
    InvalidClient,
    /// No credentials are available.
    Unauthenticated,
    /// The credential store failed.
    Storage,
    /// A refresh did not finish in time.
    Timeout,
    /// The client is misconfigured.
    Configuration,
    /// Unexpected internal failure.
    Internal,
}
