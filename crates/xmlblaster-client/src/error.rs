// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the client library.
//!
//! Every failure carries an [`ErrorKind`] tag. Retry loops dispatch on the
//! tag: only [`ErrorKind::Communication`] is retried, everything else is
//! surfaced to the caller on first occurrence.

use crate::protocol::MethodName;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by the retry and state logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport or connection-state problem. The only retryable kind.
    Communication,
    /// Request rejected by the broker or misused by the application.
    User,
    /// Bug or misconfiguration inside the client.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Communication => "communication",
            Self::User => "user",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Connection state (raised by the connections handler itself)
    // ========================================================================
    /// Operation attempted before the first successful `connect()`.
    #[error("{method}: no connection to the server, call connect() first")]
    NoConnection { method: MethodName },

    /// Operation attempted while the background reconnect is running.
    #[error("{method}: connection lost, polling for the server")]
    NoConnectionPolling { method: MethodName },

    /// Operation attempted or exhausted while the connection is dead.
    #[error("{method}: connection is dead{}", .cause.as_ref().map(|c| format!(" (last error: {})", c)).unwrap_or_default())]
    NoConnectionDead {
        method: MethodName,
        #[source]
        cause: Option<Box<Error>>,
    },

    // ========================================================================
    // Transport
    // ========================================================================
    /// Transport-level failure reported by a remote connection.
    #[error("communication failure: {0}")]
    Communication(String),

    /// I/O failure inside a transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Application / broker
    // ========================================================================
    /// The broker rejected the request.
    #[error("remote error [{code}]: {message}")]
    Remote { code: String, message: String },

    /// Invalid client configuration (unknown transport, bad property value).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication(message.into())
    }

    /// Create a broker rejection with an xmlBlaster style error code
    /// (e.g. `user.illegalArgument`).
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Tag used by retry logic.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoConnection { .. }
            | Self::NoConnectionPolling { .. }
            | Self::NoConnectionDead { .. }
            | Self::Communication(_)
            | Self::Io(_) => ErrorKind::Communication,
            Self::Remote { .. } => ErrorKind::User,
            Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True if a retry may succeed.
    pub fn is_communication(&self) -> bool {
        self.kind() == ErrorKind::Communication
    }

    /// Dotted error code in the xmlBlaster naming scheme.
    pub fn error_code(&self) -> &str {
        match self {
            Self::NoConnection { .. } => "communication.noConnection",
            Self::NoConnectionPolling { .. } => "communication.noConnection.polling",
            Self::NoConnectionDead { .. } => "communication.noConnection.dead",
            Self::Communication(_) | Self::Io(_) => "communication",
            Self::Remote { code, .. } => code,
            Self::Config(_) => "resource.configuration",
            Self::Internal(_) => "internal.unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(Error::communication("x").kind(), ErrorKind::Communication);
        assert_eq!(Error::remote("user.illegalArgument", "bad key").kind(), ErrorKind::User);
        assert_eq!(Error::config("x").kind(), ErrorKind::Internal);
        assert_eq!(Error::internal("x").kind(), ErrorKind::Internal);
        let dead = Error::NoConnectionDead {
            method: MethodName::Publish,
            cause: None,
        };
        assert!(dead.is_communication());
    }

    #[test]
    fn test_error_codes() {
        let e = Error::NoConnectionPolling {
            method: MethodName::Subscribe,
        };
        assert_eq!(e.error_code(), "communication.noConnection.polling");
        let e = Error::remote("user.publish", "rejected");
        assert_eq!(e.error_code(), "user.publish");
    }

    #[test]
    fn test_dead_display_includes_cause() {
        let e = Error::NoConnectionDead {
            method: MethodName::Publish,
            cause: Some(Box::new(Error::communication("socket closed"))),
        };
        let text = e.to_string();
        assert!(text.starts_with("publish: connection is dead"));
        assert!(text.contains("socket closed"));
        assert!(std::error::Error::source(&e).is_some());
    }
}
