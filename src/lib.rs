//! DRKR research job client.
//!
//! This crate drives DRKR deep-research jobs from the client side: it
//! creates a job, answers the follow-up questions the backend may ask, and
//! polls the job until it completes, fails, or is cancelled.
//!
//! # Overview
//!
//! - [`JobController`]: the lifecycle state machine a UI or CLI talks to
//! - [`ResearchBackend`]: the REST API seam, implemented by [`HttpBackend`]
//! - [`ResearchJob`] / [`JobStatus`] / [`JobRequest`]: wire types
//! - [`ClarificationRound`]: follow-up questions and their answers
//! - [`ClientConfig`]: base URL, timeouts and poll interval
//! - [`DrkrError`]: validation, transport and controller errors
//!
//! # Lifecycle
//!
//! ```text
//!   submit() ──→ [submit_answers()] ──→ polling every 5 s ──→ Terminal
//!    (async)          (async)            (background task)
//! ```
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use drkr_jobs::{ClientConfig, HttpBackend, JobController, JobRequest, Phase, SubmitOutcome};
//!
//! # async fn example() -> drkr_jobs::DrkrResult<()> {
//! let config = ClientConfig::load(None)?;
//! let backend = Arc::new(HttpBackend::from_config(&config)?);
//! let controller = JobController::from_config(backend, &config);
//!
//! let request = JobRequest::new("open-dr", "o3-mini", "Compare sodium-ion and LFP cells")
//!     .with_param_pairs([("temperature", "0.2")]);
//!
//! // Subscribe first so no transition is missed.
//! let mut updates = controller.subscribe();
//!
//! if let SubmitOutcome::Clarification(round) = controller.submit(request).await? {
//!     let answers = round.questions().iter().map(|_| "Focus on grid storage");
//!     controller.submit_answers(round.clone().with_answers(answers)?).await?;
//! }
//!
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow_and_update().clone();
//!     if let Some(job) = &snapshot.job {
//!         println!("{} is {}", job.job_id, job.status);
//!     }
//!     if matches!(snapshot.phase, Phase::Terminal | Phase::Error) {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod catalog;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod job;
pub mod listing;
pub mod poll;
pub mod request;

pub use auth::{Anonymous, StaticToken, TokenProvider};
pub use backend::ResearchBackend;
pub use catalog::{AiModel, ResearchService, ServiceCatalog, ServiceModel, estimate_prompt_tokens};
pub use client::{HttpBackend, HttpBackendBuilder};
pub use config::ClientConfig;
pub use controller::{ControllerSnapshot, JobController, Phase, SubmitOutcome};
pub use error::{DrkrError, DrkrResult};
pub use job::{JobId, JobStatus, ResearchJob, Visibility};
pub use listing::{JobColumn, JobTableView, ListJobsQuery, SortOrder};
pub use poll::PollSession;
pub use request::{
    AnswerRequest, ClarificationRound, CreateJobResponse, GetJobRequest, JobRequest,
    UpdateJobRequest, coerce_param_value,
};
