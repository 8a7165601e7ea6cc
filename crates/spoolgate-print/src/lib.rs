// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolgate print, the IPP-over-HTTP client for CUPS servers.  Connection
// management, request execution with a single retry, print submission, job
// queries and PPD downloads.  Domain types live in `spoolgate-core`.

pub mod async_client;
pub mod client;
pub mod codec;
pub mod connection;
pub mod executor;
pub mod http;
pub mod job_attributes;
pub mod job_uri;
pub mod ppd;
pub mod printers;
pub mod submit;
pub mod transport;

pub use async_client::AsyncCupsClient;
pub use client::CupsClient;
pub use codec::{
    AttributeLookup, IppRequest, IppResponse, IppValue, Operation, RequestBody, ResponseBuilder,
};
pub use connection::{Connection, ConnectionGate, Connector, Session};
pub use executor::RequestExecutor;
pub use job_attributes::JobStatus;
pub use printers::PrinterSummary;
pub use transport::NetConnector;
