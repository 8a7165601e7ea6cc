// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print-Job submission of a file to a CUPS queue.
//
// Never retried: a failure after the server has spooled the document would
// otherwise print it twice.  Callers that want another attempt decide that
// themselves.

use std::fs::File;
use std::io;
use std::path::Path;

use tracing::{error, info, instrument};

use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::{Diagnostic, JobId, PrintOption, StatusCode};

use crate::codec::{
    AttributeLookup, DelimiterTag, IppRequest, IppValue, Operation, RequestBody, decode_response,
};
use crate::executor::RequestExecutor;
use crate::job_uri::{printer_resource, printer_uri, validate_printer_name};

const OPERATION: &str = "Print-Job";

/// Format sent for every document; the server auto-types it.
const DOCUMENT_FORMAT: &str = "application/octet-stream";

/// Submit `file_path` to `printer_name` as `user`.
///
/// Opens its own connection and makes exactly one attempt.  Returns the
/// server-assigned job id; every failure is an `Err` carrying the diagnostic
/// captured when it happened.
#[instrument(skip(executor, options), fields(options = options.len()))]
pub fn submit(
    executor: &RequestExecutor,
    user: &str,
    printer_name: &str,
    file_path: &Path,
    title: &str,
    options: &[PrintOption],
) -> Result<JobId> {
    validate_printer_name(OPERATION, printer_name)?;

    let document = open_document(file_path).map_err(|e| SpoolgateError::Request {
        operation: OPERATION,
        diagnostic: Diagnostic::new(
            StatusCode::CLIENT_ERROR_NOT_FOUND,
            format!("unable to open print file {}: {e}", file_path.display()),
        ),
    })?;

    let gate = executor.gate();
    let mut request = IppRequest::new(Operation::PrintJob);
    request
        .add_operation(
            "printer-uri",
            IppValue::Uri(printer_uri(gate.endpoint(), printer_name)),
        )
        .add_operation(
            "requesting-user-name",
            IppValue::NameWithoutLanguage(user.to_string()),
        )
        .add_operation("job-name", IppValue::NameWithoutLanguage(title.to_string()))
        .add_operation(
            "document-format",
            IppValue::MimeMediaType(DOCUMENT_FORMAT.to_string()),
        );
    for option in options {
        request.add_job(&option.name, option_value(&option.value));
    }
    let attributes = request.encode(executor.next_request_id())?;
    let mut body = RequestBody::with_document(attributes, document)?;

    let mut connection = gate.connect()?;
    let reply = connection.exchange(&printer_resource(printer_name), &mut body);
    connection.close();

    let reply = reply.map_err(failed)?;
    let response = decode_response(&reply).map_err(|e| {
        failed(Diagnostic::new(StatusCode::SERVER_ERROR_INTERNAL, e.to_string()))
    })?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .status_message()
            .or(status.keyword())
            .unwrap_or("print job rejected");
        return Err(failed(Diagnostic::new(status, message)));
    }

    let job_id = response
        .groups_of(DelimiterTag::JobAttributes)
        .find_map(|g| g.get_integer("job-id"))
        .and_then(JobId::from_wire)
        .ok_or_else(|| {
            failed(Diagnostic::new(
                StatusCode::SERVER_ERROR_INTERNAL,
                "response carries no job-id",
            ))
        })?;

    info!(%job_id, printer = printer_name, "print job accepted");
    Ok(job_id)
}

/// Open the document for streaming; directories are refused up front.
fn open_document(path: &Path) -> io::Result<File> {
    let file = File::open(path)?;
    if file.metadata()?.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "is a directory",
        ));
    }
    Ok(file)
}

fn failed(diagnostic: Diagnostic) -> SpoolgateError {
    error!(%diagnostic, "Print-Job failed");
    SpoolgateError::Request {
        operation: OPERATION,
        diagnostic,
    }
}

/// Encode an option value the way CUPS types them: integers, booleans,
/// keywords, and everything else as a name.
pub fn option_value(value: &str) -> IppValue {
    if let Ok(n) = value.parse::<i32>() {
        IppValue::Integer(n)
    } else if value.eq_ignore_ascii_case("true") {
        IppValue::Boolean(true)
    } else if value.eq_ignore_ascii_case("false") {
        IppValue::Boolean(false)
    } else if is_keyword(value) {
        IppValue::Keyword(value.to_string())
    } else {
        IppValue::NameWithoutLanguage(value.to_string())
    }
}

fn is_keyword(value: &str) -> bool {
    value.starts_with(|c: char| c.is_ascii_lowercase())
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}
