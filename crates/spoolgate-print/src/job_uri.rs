// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `job-uri` construction, and the printer resources jobs and PPDs live
// under.

use std::fmt::Write as _;

use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::{Diagnostic, JobId, ServerEndpoint, StatusCode};

/// Longest URI we build, as HTTP_MAX_URI in the CUPS client library.
pub const URI_MAX_LENGTH: usize = 1024;

/// Resource path of a job on the server.
pub fn job_resource(job_id: JobId) -> String {
    format!("/jobs/{job_id}")
}

/// `ipp://<host>:<port>/jobs/<job_id>` for the given server.
pub fn build_job_uri(endpoint: &ServerEndpoint, job_id: JobId) -> Result<String> {
    let mut uri = String::new();
    uri.try_reserve(URI_MAX_LENGTH)
        .map_err(|_| SpoolgateError::Allocation("job URI buffer".into()))?;
    // Writing into a String cannot fail.
    let _ = write!(uri, "ipp://{}{}", endpoint.authority(), job_resource(job_id));
    Ok(uri)
}

/// Reject queue names that cannot appear in a resource path.
pub fn validate_printer_name(operation: &'static str, name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.len() > 127
        || name
            .chars()
            .any(|c| c == '/' || c == '#' || c == '?' || c.is_whitespace() || c.is_control());
    if bad {
        return Err(SpoolgateError::Request {
            operation,
            diagnostic: Diagnostic::new(
                StatusCode::CLIENT_ERROR_BAD_REQUEST,
                format!("invalid printer name '{name}'"),
            ),
        });
    }
    Ok(())
}

/// `/printers/<name>`.
pub fn printer_resource(name: &str) -> String {
    format!("/printers/{name}")
}

/// `ipp://<host>:<port>/printers/<name>`.
pub fn printer_uri(endpoint: &ServerEndpoint, name: &str) -> String {
    format!("ipp://{}{}", endpoint.authority(), printer_resource(name))
}

#[cfg(test)]
mod tests {
    use spoolgate_core::types::EncryptionMode;

    use super::*;

    #[test]
    fn job_uri_for_remote_server() {
        let endpoint = ServerEndpoint::new("print.example.com", 631, EncryptionMode::Required);
        let uri = build_job_uri(&endpoint, JobId::new(42).unwrap()).unwrap();
        assert!(uri.contains("ipp://print.example.com:631/jobs/42"));
    }

    #[test]
    fn job_uri_for_local_socket_uses_localhost() {
        let endpoint = ServerEndpoint::new("/run/cups/cups.sock", 631, EncryptionMode::Never);
        let uri = build_job_uri(&endpoint, JobId::new(7).unwrap()).unwrap();
        assert_eq!(uri, "ipp://localhost:631/jobs/7");
    }

    #[test]
    fn printer_names_are_validated() {
        assert!(validate_printer_name("Print-Job", "Office_Laser-2").is_ok());
        for bad in ["", "a/b", "lab#1", "two words", "x?y"] {
            assert!(
                validate_printer_name("Print-Job", bad).is_err(),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn printer_uri_uses_printers_path() {
        let endpoint = ServerEndpoint::new("10.0.0.5", 8631, EncryptionMode::Never);
        assert_eq!(printer_uri(&endpoint, "lab"), "ipp://10.0.0.5:8631/printers/lab");
    }

    #[test]
    fn job_resource_pattern() {
        assert_eq!(job_resource(JobId::new(4_000_000_000).unwrap()), "/jobs/4000000000");
    }
}
