// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Spoolgate CUPS client.

use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default IPP port (IANA-assigned).
pub const DEFAULT_IPP_PORT: u16 = 631;

/// How connections to the server are encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EncryptionMode {
    /// TLS from the first byte.
    Always,
    /// Plain unless the server asks for an upgrade.
    #[default]
    IfRequested,
    /// Never encrypt.
    Never,
    /// Plain connect followed by a mandatory HTTP upgrade to TLS.
    Required,
}

impl EncryptionMode {
    /// Parse an encryption setting from the environment or `client.conf`.
    ///
    /// Unrecognised values become [`EncryptionMode::Required`], never
    /// [`EncryptionMode::Never`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Self::Always,
            "ifrequested" | "if-requested" | "if_requested" => Self::IfRequested,
            "never" => Self::Never,
            "required" => Self::Required,
            other => {
                warn!(value = other, "unknown encryption mode, using Required");
                Self::Required
            }
        }
    }

    /// Canonical keyword, as accepted by `CUPS_ENCRYPTION`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfRequested => "IfRequested",
            Self::Never => "Never",
            Self::Required => "Required",
        }
    }

    /// Phrase used in the connection summary log line.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Always => "encrypting ALWAYS",
            Self::IfRequested => "encrypting IF REQUESTED",
            Self::Never => "encrypting NEVER",
            Self::Required => "encrypting REQUIRED",
        }
    }
}

impl From<String> for EncryptionMode {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<EncryptionMode> for String {
    fn from(mode: EncryptionMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address and encryption policy of the print server.
///
/// Resolved once and then only read, so it is shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Hostname, IP literal, or (when it starts with `/`) a unix socket path.
    pub host: String,
    pub port: u16,
    pub encryption: EncryptionMode,
}

impl ServerEndpoint {
    pub fn new(host: impl Into<String>, port: u16, encryption: EncryptionMode) -> Self {
        Self {
            host: host.into(),
            port,
            encryption,
        }
    }

    /// True when the host names a local domain socket.
    pub fn is_local_socket(&self) -> bool {
        self.host.starts_with('/')
    }

    /// Host as it appears in URIs and the HTTP `Host` header.
    pub fn uri_host(&self) -> String {
        if self.is_local_socket() {
            "localhost".to_string()
        } else if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// `host:port` authority for URIs and the HTTP `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.uri_host(), self.port)
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// IPP status code (RFC 8011 §4.1.6, plus the CUPS extensions we see).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: Self = Self(0x0000);
    pub const OK_IGNORED_OR_SUBSTITUTED: Self = Self(0x0001);
    pub const OK_CONFLICTING: Self = Self(0x0002);
    pub const CLIENT_ERROR_BAD_REQUEST: Self = Self(0x0400);
    pub const CLIENT_ERROR_FORBIDDEN: Self = Self(0x0401);
    pub const CLIENT_ERROR_NOT_AUTHENTICATED: Self = Self(0x0402);
    pub const CLIENT_ERROR_NOT_AUTHORIZED: Self = Self(0x0403);
    pub const CLIENT_ERROR_NOT_POSSIBLE: Self = Self(0x0404);
    pub const CLIENT_ERROR_TIMEOUT: Self = Self(0x0405);
    pub const CLIENT_ERROR_NOT_FOUND: Self = Self(0x0406);
    pub const CLIENT_ERROR_DOCUMENT_FORMAT_NOT_SUPPORTED: Self = Self(0x040A);
    pub const SERVER_ERROR_INTERNAL: Self = Self(0x0500);
    pub const SERVER_ERROR_OPERATION_NOT_SUPPORTED: Self = Self(0x0501);
    pub const SERVER_ERROR_SERVICE_UNAVAILABLE: Self = Self(0x0502);
    pub const SERVER_ERROR_DEVICE_ERROR: Self = Self(0x0504);
    pub const SERVER_ERROR_NOT_ACCEPTING_JOBS: Self = Self(0x0506);

    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Any `successful-*` status (0x0000..=0x00FF).
    pub fn is_success(self) -> bool {
        self.0 <= 0x00FF
    }

    /// RFC 8011 keyword for the code, if it is one we know.
    pub fn keyword(self) -> Option<&'static str> {
        let kw = match self {
            Self::OK => "successful-ok",
            Self::OK_IGNORED_OR_SUBSTITUTED => "successful-ok-ignored-or-substituted-attributes",
            Self::OK_CONFLICTING => "successful-ok-conflicting-attributes",
            Self::CLIENT_ERROR_BAD_REQUEST => "client-error-bad-request",
            Self::CLIENT_ERROR_FORBIDDEN => "client-error-forbidden",
            Self::CLIENT_ERROR_NOT_AUTHENTICATED => "client-error-not-authenticated",
            Self::CLIENT_ERROR_NOT_AUTHORIZED => "client-error-not-authorized",
            Self::CLIENT_ERROR_NOT_POSSIBLE => "client-error-not-possible",
            Self::CLIENT_ERROR_TIMEOUT => "client-error-timeout",
            Self::CLIENT_ERROR_NOT_FOUND => "client-error-not-found",
            Self::CLIENT_ERROR_DOCUMENT_FORMAT_NOT_SUPPORTED => {
                "client-error-document-format-not-supported"
            }
            Self::SERVER_ERROR_INTERNAL => "server-error-internal-error",
            Self::SERVER_ERROR_OPERATION_NOT_SUPPORTED => "server-error-operation-not-supported",
            Self::SERVER_ERROR_SERVICE_UNAVAILABLE => "server-error-service-unavailable",
            Self::SERVER_ERROR_DEVICE_ERROR => "server-error-device-error",
            Self::SERVER_ERROR_NOT_ACCEPTING_JOBS => "server-error-not-accepting-jobs",
            _ => return None,
        };
        Some(kw)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.keyword() {
            Some(kw) => write!(f, "{} ({kw})", self.0),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

/// Status and message captured at the point a call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub status: StatusCode,
    pub message: String,
}

impl Diagnostic {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

/// Server-assigned print job identifier.
///
/// Zero means "no job" and cannot be constructed; a failed submission is an
/// `Err` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(NonZeroU32);

impl JobId {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Convert the signed `job-id` integer carried on the wire.
    pub fn from_wire(id: i32) -> Option<Self> {
        u32::try_from(id).ok().and_then(Self::new)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IPP `job-state` values (RFC 8011 §5.3.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Held,
    Processing,
    Stopped,
    Canceled,
    Aborted,
    Completed,
}

impl JobState {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Pending),
            4 => Some(Self::Held),
            5 => Some(Self::Processing),
            6 => Some(Self::Stopped),
            7 => Some(Self::Canceled),
            8 => Some(Self::Aborted),
            9 => Some(Self::Completed),
            _ => None,
        }
    }

    /// True once the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Aborted | Self::Completed)
    }
}

/// A single `name=value` print option, as CUPS option lists carry them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintOption {
    pub name: String,
    pub value: String,
}

impl PrintOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Outcome of a conditional PPD fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PpdArtifact {
    /// A fresh copy was written here; the caller now owns the file.
    Downloaded(PathBuf),
    /// The caller's cached copy is still current; nothing was written.
    NotModified,
}

impl PpdArtifact {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Downloaded(path) => Some(path),
            Self::NotModified => None,
        }
    }
}
