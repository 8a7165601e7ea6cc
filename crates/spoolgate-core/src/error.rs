// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Spoolgate.
//
// Every variant that stems from a failed exchange carries the diagnostic
// captured at the failure site, so nothing has to be read back from a
// side channel after the call returns.

use thiserror::Error;

use crate::types::{Diagnostic, StatusCode};

/// Top-level error type for all Spoolgate operations.
#[derive(Debug, Error)]
pub enum SpoolgateError {
    // -- Transport --
    #[error("failed to connect to CUPS server {host}:{port} because {diagnostic}")]
    Connection {
        host: String,
        port: u16,
        diagnostic: Diagnostic,
    },

    #[error("request transfer failed: {0}")]
    Transport(Diagnostic),

    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    // -- Application level --
    #[error("IPP status code {code}")]
    Status { code: StatusCode },

    #[error("{operation} failed: {diagnostic}")]
    Request {
        operation: &'static str,
        diagnostic: Diagnostic,
    },

    #[error("malformed IPP message: {0}")]
    Protocol(String),

    // -- Local resources --
    #[error("failed to allocate {0}; out of memory?")]
    Allocation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Runtime(String),
}

impl SpoolgateError {
    /// The diagnostic attached to this error, if the failure produced one.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::Connection { diagnostic, .. }
            | Self::Transport(diagnostic)
            | Self::Request { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }

    /// The IPP status most closely describing this error.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { code } => Some(*code),
            other => other.diagnostic().map(|d| d.status),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpoolgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_mentions_endpoint_and_diagnostic() {
        let err = SpoolgateError::Connection {
            host: "print.example.com".into(),
            port: 631,
            diagnostic: Diagnostic::new(
                StatusCode::SERVER_ERROR_SERVICE_UNAVAILABLE,
                "Connection refused",
            ),
        };
        let text = err.to_string();
        assert!(text.contains("print.example.com:631"));
        assert!(text.contains("Connection refused"));
        assert_eq!(
            err.status_code(),
            Some(StatusCode::SERVER_ERROR_SERVICE_UNAVAILABLE)
        );
    }

    #[test]
    fn status_error_exposes_code() {
        let err = SpoolgateError::Status {
            code: StatusCode::CLIENT_ERROR_NOT_FOUND,
        };
        assert_eq!(err.status_code(), Some(StatusCode::CLIENT_ERROR_NOT_FOUND));
        assert!(err.diagnostic().is_none());
    }

    #[test]
    fn allocation_error_has_no_status() {
        let err = SpoolgateError::Allocation("job URI buffer".into());
        assert!(err.status_code().is_none());
    }
}
