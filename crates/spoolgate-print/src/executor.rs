// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request executor: one IPP request per connection, validated against a
// caller-supplied set of acceptable status codes, with a single retry.
//
// Per attempt:
//   1. open a connection (failure short-circuits)
//   2. POST the freshly encoded request to `/`
//   3. close the connection, always, before looking at the reply
//   4. accept the reply only if its status is in the acceptance set
//
// The retry wrapper makes exactly one more attempt after any failure and
// returns whatever that attempt produces.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, instrument, warn};

use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::{Diagnostic, StatusCode};

use crate::codec::{IppRequest, IppResponse, RequestBody, decode_response};
use crate::connection::ConnectionGate;

/// Resource every structured request is posted to.
pub const POST_RESOURCE: &str = "/";

/// Largest request-id allowed (RFC 8011 §4.1.2); ids run 1..=this and wrap.
pub const MAX_REQUEST_ID: u32 = i32::MAX as u32;

/// Sends IPP requests over connections from a [`ConnectionGate`].
pub struct RequestExecutor {
    gate: ConnectionGate,
    next_request_id: AtomicU32,
}

impl RequestExecutor {
    pub fn new(gate: ConnectionGate) -> Self {
        Self {
            gate,
            next_request_id: AtomicU32::new(1),
        }
    }

    pub fn gate(&self) -> &ConnectionGate {
        &self.gate
    }

    /// Allocate a request-id; each encoded request gets its own.
    pub fn next_request_id(&self) -> u32 {
        let step = |id: u32| Some(if id >= MAX_REQUEST_ID { 1 } else { id + 1 });
        match self
            .next_request_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, step)
        {
            Ok(id) | Err(id) => id,
        }
    }

    /// Run one attempt.
    ///
    /// Returns the response when its status is in `acceptable`; otherwise
    /// [`SpoolgateError::Status`] and the response is dropped.
    #[instrument(skip_all, fields(operation = request.operation_name()))]
    pub fn execute(&self, request: &IppRequest, acceptable: &[StatusCode]) -> Result<IppResponse> {
        let request_id = self.next_request_id();
        let mut body = RequestBody::new(request.encode(request_id)?);

        let mut connection = self.gate.connect()?;
        let reply = connection.exchange(POST_RESOURCE, &mut body);
        connection.close();

        let reply = reply.map_err(SpoolgateError::Transport)?;
        let response = decode_response(&reply).map_err(|e| {
            SpoolgateError::Transport(Diagnostic::new(
                StatusCode::SERVER_ERROR_INTERNAL,
                e.to_string(),
            ))
        })?;

        let code = response.status();
        if acceptable.contains(&code) {
            debug!(request_id, status = %code, "request accepted");
            Ok(response)
        } else {
            debug!(
                request_id,
                status = %code,
                message = response.status_message().unwrap_or_default(),
                "status not acceptable"
            );
            Err(SpoolgateError::Status { code })
        }
    }

    /// [`execute`](Self::execute), and on any failure one final attempt
    /// whose result is returned as-is.
    pub fn execute_with_retry(
        &self,
        request: &IppRequest,
        acceptable: &[StatusCode],
    ) -> Result<IppResponse> {
        match self.execute(request, acceptable) {
            Ok(response) => Ok(response),
            Err(first) => {
                warn!(
                    operation = request.operation_name(),
                    error = %first,
                    "request failed, retrying once"
                );
                self.execute(request, acceptable)
            }
        }
    }
}
