// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async facade over `CupsClient` for Tokio callers.
//
// Each operation runs start to finish inside one `spawn_blocking` task, so
// the connection it opens and the diagnostic it reports never cross threads
// mid-operation.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task;

use spoolgate_core::config::ClientConfig;
use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::{JobId, PpdArtifact, PrintOption};

use crate::client::CupsClient;
use crate::codec::IppResponse;

/// Cloneable async handle to a [`CupsClient`].
#[derive(Clone)]
pub struct AsyncCupsClient {
    inner: Arc<CupsClient>,
}

impl AsyncCupsClient {
    /// Build a client off the async runtime (construction connects to the server once).
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = run(move || CupsClient::new(&config)).await?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: CupsClient) -> Self {
        Self {
            inner: Arc::new(client),
        }
    }

    pub fn blocking(&self) -> &CupsClient {
        &self.inner
    }

    pub async fn list_printers(&self, requested_attributes: Vec<String>) -> Result<IppResponse> {
        let client = Arc::clone(&self.inner);
        run(move || {
            let names: Vec<&str> = requested_attributes.iter().map(String::as_str).collect();
            client.list_printers(&names)
        })
        .await
    }

    pub async fn submit(
        &self,
        printer_name: String,
        file_path: PathBuf,
        title: String,
        options: Vec<PrintOption>,
    ) -> Result<JobId> {
        let client = Arc::clone(&self.inner);
        run(move || client.submit(&printer_name, &file_path, &title, &options)).await
    }

    pub async fn get_job_attributes(
        &self,
        job_id: JobId,
        requested_attributes: Vec<String>,
    ) -> Result<IppResponse> {
        let client = Arc::clone(&self.inner);
        run(move || {
            let names: Vec<&str> = requested_attributes.iter().map(String::as_str).collect();
            client.get_job_attributes(job_id, &names)
        })
        .await
    }

    /// Returns the artifact and the modification time to pass next time.
    pub async fn fetch_ppd(
        &self,
        printer_name: String,
        modtime: Option<DateTime<Utc>>,
    ) -> Result<(PpdArtifact, Option<DateTime<Utc>>)> {
        let client = Arc::clone(&self.inner);
        run(move || {
            let mut modtime = modtime;
            let artifact = client.fetch_ppd(&printer_name, &mut modtime)?;
            Ok((artifact, modtime))
        })
        .await
    }
}

async fn run<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(op)
        .await
        .map_err(|e| SpoolgateError::Runtime(e.to_string()))?
}
