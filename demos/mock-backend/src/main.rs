//! In-memory DRKR backend driven through a `JobController`.
//!
//! The simulated service asks one follow-up question, then reports the job
//! as running for a couple of polls before completing it.
//!
//! Run with `RUST_LOG=drkr_jobs=debug` to see every poll.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use drkr_jobs::{
    AnswerRequest, CreateJobResponse, DrkrError, DrkrResult, GetJobRequest, JobController, JobId,
    JobRequest, JobStatus, ListJobsQuery, Phase, ResearchBackend, ResearchJob, ResearchService,
    ServiceCatalog, SubmitOutcome, UpdateJobRequest, estimate_prompt_tokens,
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Polls a job must survive before the simulator completes it.
const POLLS_UNTIL_DONE: u32 = 2;

struct SimulatedJob {
    job: ResearchJob,
    polls: u32,
}

/// In-memory backend.
#[derive(Default)]
struct SimulatedBackend {
    jobs: Mutex<HashMap<JobId, SimulatedJob>>,
    next_id: Mutex<i64>,
}

impl SimulatedBackend {
    fn find(&self, request: &GetJobRequest) -> DrkrResult<ResearchJob> {
        let jobs = self.jobs.lock().map_err(|_| poisoned())?;
        jobs.values()
            .find(|s| {
                request.job_id.as_ref() == Some(&s.job.job_id) || request.id == Some(s.job.id)
            })
            .map(|s| s.job.clone())
            .ok_or_else(|| DrkrError::JobNotFound(request.describe()))
    }

    fn with_job<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut SimulatedJob) -> T,
    ) -> DrkrResult<T> {
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| DrkrError::JobNotFound(job_id.to_string()))?;
        Ok(f(job))
    }
}

fn poisoned() -> DrkrError {
    DrkrError::Network("simulator state poisoned".into())
}

#[async_trait]
impl ResearchBackend for SimulatedBackend {
    async fn create_job(&self, request: &JobRequest) -> DrkrResult<CreateJobResponse> {
        request.validate()?;
        let id = {
            let mut next = self.next_id.lock().map_err(|_| poisoned())?;
            *next += 1;
            *next
        };

        let job: ResearchJob = serde_json::from_value(json!({
            "id": id,
            "job_id": format!("sim-{id}"),
            "status": JobStatus::PendingAnswers,
            "service": request.service,
            "prompt": request.prompt,
            "model_name": request.model,
            "model_params": request.model_params,
            "created_at": "2025-03-01T12:00:00Z",
        }))?;

        self.jobs.lock().map_err(|_| poisoned())?.insert(
            job.job_id.clone(),
            SimulatedJob {
                job: job.clone(),
                polls: 0,
            },
        );

        Ok(CreateJobResponse {
            job,
            questions: Some(vec!["Which time range should the report cover?".into()]),
        })
    }

    async fn get_job(&self, request: &GetJobRequest) -> DrkrResult<ResearchJob> {
        let job_id = self.find(request)?.job_id;
        self.with_job(&job_id, |sim| {
            if sim.job.status == JobStatus::Running {
                sim.polls += 1;
                if sim.polls > POLLS_UNTIL_DONE {
                    sim.job.status = JobStatus::Completed;
                    sim.job.deep_research_id = Some(sim.job.id * 100);
                }
            }
            sim.job.clone()
        })
    }

    async fn answer_job(&self, request: &AnswerRequest) -> DrkrResult<ResearchJob> {
        self.with_job(&request.job_id, |sim| {
            sim.job.status = JobStatus::Running;
            sim.job.clone()
        })
    }

    async fn update_job(&self, id: i64, request: &UpdateJobRequest) -> DrkrResult<ResearchJob> {
        let job_id = self.find(&GetJobRequest::by_id(id))?.job_id;
        self.with_job(&job_id, |sim| {
            if let Some(status) = request.status {
                sim.job.status = status;
            }
            if let Some(visibility) = request.visibility {
                sim.job.visibility = visibility;
            }
            sim.job.clone()
        })
    }

    async fn list_jobs(&self, query: &ListJobsQuery) -> DrkrResult<Vec<ResearchJob>> {
        let jobs = self.jobs.lock().map_err(|_| poisoned())?;
        Ok(jobs
            .values()
            .map(|s| s.job.clone())
            .filter(|j| query.status.is_none_or(|status| j.status == status))
            .collect())
    }

    async fn list_services(&self, service: Option<&str>) -> DrkrResult<Vec<ResearchService>> {
        let open_dr: ResearchService = serde_json::from_value(json!({
            "id": 1,
            "service_key": "open-dr",
            "name": "Open Deep Research",
            "service_models": [{
                "id": 1,
                "service_id": 1,
                "model_id": 7,
                "is_default": true,
                "model": {
                    "id": 7,
                    "model_key": "o3-mini",
                    "default_params": {"temperature": 0.2},
                    "max_tokens": 4096
                }
            }]
        }))?;
        Ok(std::iter::once(open_dr)
            .filter(|s| service.is_none_or(|key| s.service_key == key))
            .collect())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let backend = Arc::new(SimulatedBackend::default());
    let catalog = ServiceCatalog::new(backend.list_services(None).await?);
    let service = catalog
        .service("open-dr")
        .ok_or("open-dr missing from catalog")?;
    let model = service.preferred_model().ok_or("open-dr has no models")?;

    let prompt = "Summarize recent progress in sodium-ion batteries";
    info!(
        service = %service.service_key,
        model = %model.model_key,
        tokens = estimate_prompt_tokens(prompt),
        "using catalog defaults"
    );

    let controller = JobController::with_poll_interval(Arc::clone(&backend), Duration::from_secs(1));
    let mut updates = controller.subscribe();

    let request = JobRequest::new(&service.service_key, &model.model_key, prompt)
        .with_param_pairs(model.default_param_pairs());

    match controller.submit(request).await? {
        SubmitOutcome::Clarification(mut round) => {
            for (i, question) in round.questions().to_vec().iter().enumerate() {
                println!("Q: {question}");
                round.set_answer(i, "The last three years")?;
            }
            let job = controller.submit_answers(round).await?;
            println!("Job {} is {}", job.job_id, job.status);
        }
        SubmitOutcome::Polling(job) => println!("Job {} is {}", job.job_id, job.status),
    }

    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        if let Some(job) = &snapshot.job {
            println!("[{}] {} is {}", snapshot.phase, job.job_id, job.status);
        }
        match snapshot.phase {
            Phase::Terminal => break,
            Phase::Error => {
                println!("{}", snapshot.last_error.unwrap_or_default());
                break;
            }
            _ => {}
        }
    }

    if let Some(job) = controller.job() {
        match job.deep_research_id {
            Some(report) => println!("Report {report} ready for {}", job.job_id),
            None => println!("{} ended as {}", job.job_id, job.status),
        }
    }

    let finished = backend
        .list_jobs(&ListJobsQuery::default().status(JobStatus::Completed))
        .await?;
    println!("{} completed job(s)", finished.len());

    Ok(())
}
