//! Farm manager HTTP client.
//!
//! The manager publishes the queue priority list and receives finished
//! artifacts:
//!
//! - `GET  /available_jobs` → `[[queue-id, job-type], ...]`, highest priority
//!   first.
//! - `POST /upload_render?uuid=<id>` with one multipart part named after the
//!   artifact label, file name `<label>.<extension>`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::error::NetError;
use crate::messages::AvailableJob;

/// Default manager base URL.
pub const DEFAULT_MANAGER_URL: &str = "http://localhost:8888";

/// The environment variable used to override the manager URL.
pub const MANAGER_URL_ENV: &str = "MANAGER_URL";

/// The operations the dispatcher needs from the manager.
#[async_trait]
pub trait Manager: Send + Sync {
    /// Fetch the queue priority list.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] on transport failure, a non-success status, or an
    /// unparseable body.
    async fn available_jobs(&self) -> Result<Vec<AvailableJob>, NetError>;

    /// Upload one artifact of job `uuid`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] on transport failure or a non-success status.
    async fn upload_render(
        &self,
        uuid: &str,
        label: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), NetError>;
}

/// [`Manager`] over HTTP.
#[derive(Debug, Clone)]
pub struct ManagerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ManagerClient {
    /// Create a client for the manager at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest` client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// The manager base URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl Manager for ManagerClient {
    async fn available_jobs(&self) -> Result<Vec<AvailableJob>, NetError> {
        let resp = self.http.get(self.url("available_jobs")).send().await?;
        let resp = check_status(resp).await?;
        let jobs: Vec<AvailableJob> = resp.json().await?;
        debug!(queues = jobs.len(), "fetched job priority list");
        Ok(jobs)
    }

    async fn upload_render(
        &self,
        uuid: &str,
        label: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), NetError> {
        let size = bytes.len();
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part(label.to_string(), part);

        let resp = self
            .http
            .post(self.url("upload_render"))
            .query(&[("uuid", uuid)])
            .multipart(form)
            .send()
            .await?;
        check_status(resp).await?;
        debug!(uuid, label, file_name, size, "uploaded render");
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, NetError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(NetError::Status {
        status: status.as_u16(),
        body,
    })
}
