// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blocking CUPS client bound to one server.
//
// Every call opens its own connection, so a `CupsClient` can be shared
// between threads freely.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use spoolgate_core::config::ClientConfig;
use spoolgate_core::error::Result;
use spoolgate_core::types::{JobId, PpdArtifact, PrintOption, ServerEndpoint, StatusCode};

use crate::codec::{IppRequest, IppResponse};
use crate::connection::{ConnectionGate, Connector};
use crate::executor::RequestExecutor;
use crate::transport::NetConnector;

/// Client for a single CUPS server.
pub struct CupsClient {
    executor: RequestExecutor,
    user: String,
    ppd_dir: PathBuf,
}

impl CupsClient {
    /// Resolve `config`, connect once to prove the server is reachable, and
    /// return a client for it.  `config.ca_file` adds trust anchors for TLS.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let connector =
            NetConnector::with_ca_file(config.connect_timeout(), config.ca_file.as_deref())?;
        Self::with_connector(config, Arc::new(connector))
    }

    /// As [`new`](Self::new), opening sessions through `connector`.
    #[instrument(skip_all, fields(server = %config.server, port = config.port))]
    pub fn with_connector(config: &ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let endpoint = Arc::new(config.endpoint()?);
        let gate = ConnectionGate::new(Arc::clone(&endpoint), connector);

        // Fail construction if the server cannot be reached.
        let first = gate.connect()?;
        gate.close(first);

        info!(
            "connected to CUPS server {} {}",
            endpoint,
            endpoint.encryption.describe()
        );

        Ok(Self {
            executor: RequestExecutor::new(gate),
            user: config.user.clone(),
            ppd_dir: config.ppd_dir.clone().unwrap_or_else(std::env::temp_dir),
        })
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        self.executor.gate().endpoint()
    }

    /// User print jobs are submitted as by [`submit`](Self::submit).
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Directory downloaded PPDs are written to.
    pub fn ppd_dir(&self) -> &Path {
        &self.ppd_dir
    }

    /// Run one request with no retry.
    pub fn execute(&self, request: &IppRequest, acceptable: &[StatusCode]) -> Result<IppResponse> {
        self.executor.execute(request, acceptable)
    }

    /// Run one request, retrying once on any failure.
    pub fn execute_with_retry(
        &self,
        request: &IppRequest,
        acceptable: &[StatusCode],
    ) -> Result<IppResponse> {
        self.executor.execute_with_retry(request, acceptable)
    }

    /// CUPS-Get-Printers.
    pub fn list_printers(&self, requested_attributes: &[&str]) -> Result<IppResponse> {
        crate::printers::list_printers(&self.executor, requested_attributes)
    }

    /// Print-Job as the configured user.
    pub fn submit(
        &self,
        printer_name: &str,
        file_path: &Path,
        title: &str,
        options: &[PrintOption],
    ) -> Result<JobId> {
        self.submit_as(&self.user, printer_name, file_path, title, options)
    }

    /// Print-Job as `user`.
    pub fn submit_as(
        &self,
        user: &str,
        printer_name: &str,
        file_path: &Path,
        title: &str,
        options: &[PrintOption],
    ) -> Result<JobId> {
        crate::submit::submit(&self.executor, user, printer_name, file_path, title, options)
    }

    /// Get-Job-Attributes.
    pub fn get_job_attributes(
        &self,
        job_id: JobId,
        requested_attributes: &[&str],
    ) -> Result<IppResponse> {
        crate::job_attributes::get_job_attributes(&self.executor, job_id, requested_attributes)
    }

    /// Conditional PPD download into [`ppd_dir`](Self::ppd_dir).
    pub fn fetch_ppd(
        &self,
        printer_name: &str,
        modtime: &mut Option<DateTime<Utc>>,
    ) -> Result<PpdArtifact> {
        crate::ppd::fetch_ppd(self.executor.gate(), printer_name, modtime, &self.ppd_dir)
    }

    /// `job-uri` of `job_id` on this server.
    pub fn build_job_uri(&self, job_id: JobId) -> Result<String> {
        crate::job_uri::build_job_uri(self.endpoint(), job_id)
    }
}
