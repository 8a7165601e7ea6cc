// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer enumeration via CUPS-Get-Printers.
//
// "Not found" is an acceptable outcome: a server with no queues answers
// client-error-not-found rather than an empty list.

use tracing::{debug, error, instrument};

use spoolgate_core::error::Result;
use spoolgate_core::types::StatusCode;

use crate::codec::{AttributeLookup, DelimiterTag, IppRequest, IppResponse, IppValue, Operation};
use crate::executor::RequestExecutor;

pub const REQUESTED_ATTRIBUTES: &str = "requested-attributes";

/// Acceptance set for printer enumeration.
pub const LIST_PRINTERS_ACCEPTABLE: [StatusCode; 2] =
    [StatusCode::OK, StatusCode::CLIENT_ERROR_NOT_FOUND];

/// Fetch all printers with the requested attributes.  The caller owns the
/// returned response.
#[instrument(skip(executor))]
pub fn list_printers(
    executor: &RequestExecutor,
    requested_attributes: &[&str],
) -> Result<IppResponse> {
    let mut request = IppRequest::new(Operation::CupsGetPrinters);
    request.add_operation_values(REQUESTED_ATTRIBUTES, keywords(requested_attributes));

    match executor.execute_with_retry(&request, &LIST_PRINTERS_ACCEPTABLE) {
        Ok(response) => {
            debug!(
                printers = response.groups_of(DelimiterTag::PrinterAttributes).count(),
                "printers listed"
            );
            Ok(response)
        }
        Err(e) => {
            error!(error = %e, "CUPS-Get-Printers failed");
            Err(e)
        }
    }
}

pub(crate) fn keywords(names: &[&str]) -> Vec<IppValue> {
    names
        .iter()
        .map(|name| IppValue::Keyword((*name).to_string()))
        .collect()
}

/// IPP `printer-state` (RFC 8011 §5.4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterState {
    Idle,
    Processing,
    Stopped,
}

impl PrinterState {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Idle),
            4 => Some(Self::Processing),
            5 => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// The commonly used attributes of one printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterSummary {
    pub name: String,
    pub state: Option<PrinterState>,
    pub state_reasons: Vec<String>,
    pub uri: Option<String>,
    pub info: Option<String>,
    pub is_accepting_jobs: Option<bool>,
}

impl PrinterSummary {
    /// One summary per printer group that carries a `printer-name`.
    pub fn from_response(response: &IppResponse) -> Vec<Self> {
        response
            .groups_of(DelimiterTag::PrinterAttributes)
            .filter_map(|group| {
                let name = group.get_string("printer-name")?.to_string();
                Some(Self {
                    name,
                    state: group.get_integer("printer-state").and_then(PrinterState::from_wire),
                    state_reasons: group
                        .get_strings("printer-state-reasons")
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    uri: group.get_string("printer-uri-supported").map(str::to_string),
                    info: group.get_string("printer-info").map(str::to_string),
                    is_accepting_jobs: group.get_bool("printer-is-accepting-jobs"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spoolgate_core::error::SpoolgateError;
    use spoolgate_core::types::{EncryptionMode, ServerEndpoint};

    use super::*;
    use crate::codec::{ResponseBuilder, decode_response};
    use crate::connection::ConnectionGate;
    use crate::connection::fake::{FakeConnector, Script};
    use crate::executor::tests::reply;

    fn executor(scripts: Vec<Script>) -> (RequestExecutor, Arc<FakeConnector>) {
        let connector = FakeConnector::new(scripts);
        let endpoint = Arc::new(ServerEndpoint::new("localhost", 631, EncryptionMode::Never));
        (
            RequestExecutor::new(ConnectionGate::new(endpoint, connector.clone())),
            connector,
        )
    }

    fn two_printers() -> Vec<u8> {
        let mut builder = ResponseBuilder::new(StatusCode::OK, 1, "successful-ok");
        builder
            .begin_group(DelimiterTag::PrinterAttributes)
            .attr("printer-name", IppValue::NameWithoutLanguage("lab".into()))
            .attr("printer-state", IppValue::Enum(3))
            .attr("printer-state-reasons", IppValue::Keyword("none".into()))
            .attr("printer-is-accepting-jobs", IppValue::Boolean(true))
            .attr(
                "printer-uri-supported",
                IppValue::Uri("ipp://localhost:631/printers/lab".into()),
            );
        builder
            .begin_group(DelimiterTag::PrinterAttributes)
            .attr("printer-name", IppValue::NameWithoutLanguage("office".into()))
            .attr("printer-state", IppValue::Enum(5))
            .attr(
                "printer-state-reasons",
                IppValue::Array(vec![
                    IppValue::Keyword("media-empty".into()),
                    IppValue::Keyword("paused".into()),
                ]),
            );
        builder.build().unwrap()
    }

    #[test]
    fn sends_requested_attributes() {
        let (executor, connector) = executor(vec![Script::Reply(Ok(two_printers()))]);
        list_printers(&executor, &["printer-name", "printer-state"]).unwrap();

        let sent = decode_response(&connector.last_request().unwrap()).unwrap();
        // The request header carries the operation where a reply has a status.
        assert_eq!(sent.status().as_u16(), Operation::CupsGetPrinters as u16);
        assert_eq!(
            sent.operation_attributes().unwrap().get_strings(REQUESTED_ATTRIBUTES),
            vec!["printer-name", "printer-state"]
        );
    }

    #[test]
    fn not_found_means_no_printers() {
        let (executor, connector) = executor(vec![Script::Reply(Ok(reply(
            StatusCode::CLIENT_ERROR_NOT_FOUND,
        )))]);
        let response = list_printers(&executor, &["printer-name"]).unwrap();
        assert_eq!(response.status(), StatusCode::CLIENT_ERROR_NOT_FOUND);
        assert_eq!(connector.connects(), 1);
    }

    #[test]
    fn failure_is_retried_once() {
        let (executor, connector) = executor(vec![
            Script::Reply(Ok(reply(StatusCode::CLIENT_ERROR_FORBIDDEN))),
            Script::Reply(Ok(reply(StatusCode::CLIENT_ERROR_FORBIDDEN))),
        ]);
        let err = list_printers(&executor, &[]).unwrap_err();
        assert!(matches!(err, SpoolgateError::Status { .. }));
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.closes(), 2);
    }

    #[test]
    fn summaries_from_printer_groups() {
        let response = decode_response(&two_printers()).unwrap();
        let printers = PrinterSummary::from_response(&response);
        assert_eq!(printers.len(), 2);
        assert_eq!(printers[0].name, "lab");
        assert_eq!(printers[0].state, Some(PrinterState::Idle));
        assert_eq!(printers[0].is_accepting_jobs, Some(true));
        assert_eq!(
            printers[0].uri.as_deref(),
            Some("ipp://localhost:631/printers/lab")
        );
        assert_eq!(printers[1].state, Some(PrinterState::Stopped));
        assert_eq!(printers[1].state_reasons, vec!["media-empty", "paused"]);
    }
}
