//! HTTP implementation of [`ResearchBackend`] on top of `reqwest`.
//!
//! ```rust,no_run
//! use drkr_jobs::{HttpBackend, JobRequest, ResearchBackend, StaticToken};
//!
//! # async fn example() -> drkr_jobs::DrkrResult<()> {
//! let backend = HttpBackend::builder()
//!     .base_url("https://drkr.example.com")
//!     .token_provider(StaticToken::new("api-key"))
//!     .build()?;
//!
//! let created = backend
//!     .create_job(&JobRequest::new("open-dr", "o3-mini", "State of solid-state batteries"))
//!     .await?;
//! println!("created {}", created.job.job_id);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::{Anonymous, StaticToken, TokenProvider, authorize};
use crate::backend::ResearchBackend;
use crate::catalog::ResearchService;
use crate::config::{ClientConfig, DEFAULT_BASE_URL};
use crate::error::{DrkrError, DrkrResult};
use crate::job::ResearchJob;
use crate::listing::ListJobsQuery;
use crate::request::{AnswerRequest, CreateJobResponse, GetJobRequest, JobRequest, UpdateJobRequest};

const JOBS_PATH: &str = "/api/research-jobs";
const SERVICES_PATH: &str = "/api/research-services";

/// DRKR REST client.
#[derive(Clone)]
pub struct HttpBackend {
    root: String,
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend").field("root", &self.root).finish()
    }
}

impl HttpBackend {
    pub fn builder() -> HttpBackendBuilder {
        HttpBackendBuilder::new()
    }

    /// Build a client from resolved configuration. A configured
    /// `api_token` becomes a [`StaticToken`].
    pub fn from_config(config: &ClientConfig) -> DrkrResult<Self> {
        config.validate()?;
        let mut builder = Self::builder()
            .base_url(config.api_root())
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout());
        if let Some(token) = &config.api_token {
            builder = builder.token_provider(StaticToken::new(token.clone()));
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.root
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.root, path)
    }

    /// Authorize, send, and decode one request.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> DrkrResult<T> {
        let request = authorize(self.tokens.as_ref(), request).await?;
        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            warn!(operation = what, error = %e, "request failed");
            DrkrError::from(e)
        })?;

        let status = response.status();
        debug!(operation = what, %status, elapsed = ?start.elapsed(), "response received");
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(operation = what, %status, error = %e, "could not read error body");
                    format!("unreadable response body: {e}")
                }
            };
            let err = DrkrError::from_status(status.as_u16(), &body);
            warn!(operation = what, %status, error = %err, "backend rejected request");
            return Err(err);
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DrkrError::Decode(format!("{what}: {e}")))
    }
}

#[async_trait]
impl ResearchBackend for HttpBackend {
    async fn create_job(&self, request: &JobRequest) -> DrkrResult<CreateJobResponse> {
        let builder = self.http.post(self.url(JOBS_PATH)).json(request);
        self.send(builder, "create_job").await
    }

    async fn get_job(&self, request: &GetJobRequest) -> DrkrResult<ResearchJob> {
        let builder = self.http.post(self.url(&format!("{JOBS_PATH}/get"))).json(request);
        self.send(builder, "get_job").await
    }

    async fn answer_job(&self, request: &AnswerRequest) -> DrkrResult<ResearchJob> {
        let builder = self
            .http
            .post(self.url(&format!("{JOBS_PATH}/answer")))
            .json(request);
        self.send(builder, "answer_job").await
    }

    async fn update_job(&self, id: i64, request: &UpdateJobRequest) -> DrkrResult<ResearchJob> {
        let builder = self
            .http
            .patch(self.url(&format!("{JOBS_PATH}/{id}")))
            .json(request);
        self.send(builder, "update_job").await
    }

    async fn list_jobs(&self, query: &ListJobsQuery) -> DrkrResult<Vec<ResearchJob>> {
        let builder = self.http.get(self.url(JOBS_PATH)).query(query);
        self.send(builder, "list_jobs").await
    }

    async fn list_services(&self, service: Option<&str>) -> DrkrResult<Vec<ResearchService>> {
        let mut builder = self.http.get(self.url(SERVICES_PATH));
        if let Some(service) = service {
            builder = builder.query(&[("service", service)]);
        }
        self.send(builder, "list_services").await
    }
}

/// Builder for [`HttpBackend`].
pub struct HttpBackendBuilder {
    base_url: String,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpBackendBuilder {
    fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            connect_timeout: None,
            tokens: Arc::new(Anonymous),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Whole-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.tokens = Arc::new(provider);
        self
    }

    pub fn shared_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.tokens = provider;
        self
    }

    pub fn build(self) -> DrkrResult<HttpBackend> {
        let root = self.base_url.trim().trim_end_matches('/').to_string();
        if !(root.starts_with("http://") || root.starts_with("https://")) {
            return Err(DrkrError::Configuration(format!(
                "base_url must be http(s): {root}"
            )));
        }

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            http = http.connect_timeout(timeout);
        }
        let http = http
            .build()
            .map_err(|e| DrkrError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(HttpBackend {
            root,
            http,
            tokens: self.tokens,
        })
    }
}
