// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conditional PPD download.
//
// The PPD is streamed into a temporary file in the caller's directory.  Only
// a 200 reply keeps the file; every other outcome removes it before
// returning.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::{Diagnostic, PpdArtifact, StatusCode};

use crate::connection::ConnectionGate;
use crate::http::ipp_status_for_http;
use crate::job_uri::{printer_resource, validate_printer_name};

const OPERATION: &str = "Get-PPD";

/// Capacity reserved for the downloaded file's path.
pub const PATH_MAX: usize = 4096;

/// `/printers/<name>.ppd`.
pub fn ppd_resource(printer_name: &str) -> String {
    format!("{}.ppd", printer_resource(printer_name))
}

/// Download the PPD for `printer_name` into `ppd_dir` unless the copy dated
/// `modtime` is still current.
///
/// On a fresh download `modtime` is set to the server's `Last-Modified`
/// (or now, when the server sends none) and the caller owns the returned
/// file.  `modtime` is left alone on every other outcome.
#[instrument(skip(gate, modtime), fields(printer = printer_name))]
pub fn fetch_ppd(
    gate: &ConnectionGate,
    printer_name: &str,
    modtime: &mut Option<DateTime<Utc>>,
    ppd_dir: &Path,
) -> Result<PpdArtifact> {
    validate_printer_name(OPERATION, printer_name)?;

    let mut path = PathBuf::new();
    path.try_reserve(PATH_MAX)
        .map_err(|_| SpoolgateError::Allocation("PPD path buffer".into()))?;

    let mut connection = gate.connect()?;
    let mut file = tempfile::Builder::new()
        .prefix("spoolgate-")
        .suffix(".ppd")
        .tempfile_in(ppd_dir)?;

    let reply = connection.fetch(&ppd_resource(printer_name), *modtime, &mut file);
    connection.close();

    let reply = match reply {
        Ok(reply) => reply,
        Err(diagnostic) => {
            discard(file);
            return Err(SpoolgateError::Request {
                operation: OPERATION,
                diagnostic,
            });
        }
    };

    match reply.status {
        200 => {
            let (_, kept) = file.keep().map_err(|e| SpoolgateError::Io(e.error))?;
            path.push(kept);
            *modtime = Some(reply.last_modified.unwrap_or_else(Utc::now));
            info!(path = %path.display(), "PPD downloaded");
            Ok(PpdArtifact::Downloaded(path))
        }
        304 => {
            discard(file);
            debug!("cached PPD is current");
            Ok(PpdArtifact::NotModified)
        }
        status => {
            discard(file);
            let message = format!("HTTP status {status} fetching PPD");
            match ipp_status_for_http(status) {
                Some(code) => Err(SpoolgateError::Request {
                    operation: OPERATION,
                    diagnostic: Diagnostic::new(code, message),
                }),
                None => Err(SpoolgateError::Transport(Diagnostic::new(
                    StatusCode::SERVER_ERROR_INTERNAL,
                    message,
                ))),
            }
        }
    }
}

/// Remove a partial or unwanted download.  Failure is logged and ignored.
fn discard(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        warn!(path = %path.display(), error = %e, "failed to remove temporary PPD");
    }
}
