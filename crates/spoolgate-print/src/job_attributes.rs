// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Get-Job-Attributes for a single job.

use tracing::{debug, error, instrument};

use spoolgate_core::error::Result;
use spoolgate_core::types::{JobId, JobState, StatusCode};

use crate::codec::{AttributeLookup, DelimiterTag, IppRequest, IppResponse, IppValue, Operation};
use crate::executor::RequestExecutor;
use crate::job_uri::build_job_uri;
use crate::printers::{REQUESTED_ATTRIBUTES, keywords};

pub const GET_JOB_ATTRIBUTES_ACCEPTABLE: [StatusCode; 1] = [StatusCode::OK];

/// Fetch `requested_attributes` of `job_id`.  The caller owns the response.
#[instrument(skip(executor), fields(job_id = %job_id))]
pub fn get_job_attributes(
    executor: &RequestExecutor,
    job_id: JobId,
    requested_attributes: &[&str],
) -> Result<IppResponse> {
    let job_uri = build_job_uri(executor.gate().endpoint(), job_id)?;

    let mut request = IppRequest::new(Operation::GetJobAttributes);
    request
        .add_operation("job-uri", IppValue::Uri(job_uri))
        .add_operation_values(REQUESTED_ATTRIBUTES, keywords(requested_attributes));

    executor
        .execute_with_retry(&request, &GET_JOB_ATTRIBUTES_ACCEPTABLE)
        .inspect(|_| debug!("job attributes fetched"))
        .inspect_err(|e| error!(error = %e, "Get-Job-Attributes failed"))
}

/// The job attributes callers usually poll for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: Option<JobState>,
    pub state_reasons: Vec<String>,
    pub name: Option<String>,
    pub printer_state_message: Option<String>,
}

impl JobStatus {
    /// Read the first job group of a Get-Job-Attributes response.
    pub fn from_response(response: &IppResponse) -> Option<Self> {
        let group = response.groups_of(DelimiterTag::JobAttributes).next()?;
        Some(Self {
            state: group.get_integer("job-state").and_then(JobState::from_wire),
            state_reasons: group
                .get_strings("job-state-reasons")
                .into_iter()
                .map(str::to_string)
                .collect(),
            name: group.get_string("job-name").map(str::to_string),
            printer_state_message: group
                .get_string("job-printer-state-message")
                .map(str::to_string),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_some_and(|s| s.is_terminal())
    }
}
