//! The DRKR backend seam.
//!
//! The [`ResearchBackend`] trait is everything the job controller needs from
//! the REST API:
//!
//! ```text
//!   create_job() ──→ answer_job()? ──→ get_job() … get_job() ──→ terminal
//!     (async)          (async)          (async, polled)
//! ```
//!
//! ## Method table
//!
//! | Method | Endpoint | Returns |
//! |--------|----------|---------|
//! | `create_job()` | `POST /api/research-jobs` | `DrkrResult<CreateJobResponse>` |
//! | `get_job()` | `POST /api/research-jobs/get` | `DrkrResult<ResearchJob>` |
//! | `answer_job()` | `POST /api/research-jobs/answer` | `DrkrResult<ResearchJob>` |
//! | `update_job()` | `PATCH /api/research-jobs/{id}` | `DrkrResult<ResearchJob>` |
//! | `list_jobs()` | `GET /api/research-jobs` | `DrkrResult<Vec<ResearchJob>>` |
//! | `list_services()` | `GET /api/research-services` | `DrkrResult<Vec<ResearchService>>` |
//! | `cancel_job()` | provided, via `update_job()` | `DrkrResult<ResearchJob>` |
//! | `refresh_job()` | provided, via `get_job()` | `DrkrResult<ResearchJob>` |
//!
//! [`HttpBackend`](crate::client::HttpBackend) is the production
//! implementation; tests and demos implement the trait in memory.

use async_trait::async_trait;

use crate::catalog::ResearchService;
use crate::error::DrkrResult;
use crate::job::ResearchJob;
use crate::listing::ListJobsQuery;
use crate::request::{AnswerRequest, CreateJobResponse, GetJobRequest, JobRequest, UpdateJobRequest};

/// Client view of the DRKR research job API.
///
/// Every method is a single request. Implementations do not retry; the
/// controller decides what a failure means.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Create a job. The response may carry follow-up questions.
    async fn create_job(&self, request: &JobRequest) -> DrkrResult<CreateJobResponse>;

    /// Fetch the current state of a job.
    async fn get_job(&self, request: &GetJobRequest) -> DrkrResult<ResearchJob>;

    /// Answer the follow-up questions of a job.
    async fn answer_job(&self, request: &AnswerRequest) -> DrkrResult<ResearchJob>;

    /// Update a job's status or visibility by row id.
    async fn update_job(&self, id: i64, request: &UpdateJobRequest) -> DrkrResult<ResearchJob>;

    /// List jobs visible to the caller.
    async fn list_jobs(&self, query: &ListJobsQuery) -> DrkrResult<Vec<ResearchJob>>;

    /// List research services, optionally restricted to one service key.
    async fn list_services(&self, service: Option<&str>) -> DrkrResult<Vec<ResearchService>>;

    /// Ask the backend to cancel `job`.
    async fn cancel_job(&self, job: &ResearchJob) -> DrkrResult<ResearchJob> {
        self.update_job(job.id, &UpdateJobRequest::cancel()).await
    }

    /// Re-fetch `job` by its service-level id.
    async fn refresh_job(&self, job: &ResearchJob) -> DrkrResult<ResearchJob> {
        self.get_job(&GetJobRequest::for_job(job)).await
    }
}
