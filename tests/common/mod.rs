//! Scripted in-memory backend for controller tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use drkr_jobs::{
    AnswerRequest, CreateJobResponse, DrkrError, DrkrResult, GetJobRequest, JobRequest, JobStatus,
    ListJobsQuery, ResearchBackend, ResearchJob, ResearchService, UpdateJobRequest,
};
use serde_json::json;

/// Build a job record.
pub fn job(id: i64, job_id: &str, status: JobStatus) -> ResearchJob {
    serde_json::from_value(json!({
        "id": id,
        "job_id": job_id,
        "status": status,
        "service": "s1",
        "model_name": "m1",
        "prompt": "hello",
        "visibility": "private",
        "created_at": "2025-03-01T12:00:00Z"
    }))
    .unwrap()
}

pub fn completed(id: i64, job_id: &str, deep_research_id: i64) -> ResearchJob {
    let mut job = job(id, job_id, JobStatus::Completed);
    job.deep_research_id = Some(deep_research_id);
    job
}

/// A scripted reply; errors are built on demand since `DrkrError` is not
/// `Clone`.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail(u16, &'static str),
    Offline,
}

impl<T> Reply<T> {
    fn into_result(self) -> DrkrResult<T> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Fail(status, message) => Err(DrkrError::from_status(status, message)),
            Reply::Offline => Err(DrkrError::Network("connection refused".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(JobRequest),
    Get(GetJobRequest),
    Answer(AnswerRequest),
    Update(i64, UpdateJobRequest),
    List(ListJobsQuery),
    Services(Option<String>),
}

/// Backend whose replies are queued up front.
///
/// When the status queue runs dry, `get_job` keeps returning the last job
/// it returned.
#[derive(Default)]
pub struct MockBackend {
    creates: Mutex<VecDeque<Reply<CreateJobResponse>>>,
    answers: Mutex<VecDeque<Reply<ResearchJob>>>,
    statuses: Mutex<VecDeque<Reply<ResearchJob>>>,
    updates: Mutex<VecDeque<Reply<ResearchJob>>>,
    last_status: Mutex<Option<ResearchJob>>,
    calls: Mutex<Vec<Call>>,
    delay: Duration,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call take `delay` (virtual time in paused tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn on_create(self, reply: Reply<CreateJobResponse>) -> Self {
        self.creates.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_create_job(self, job: ResearchJob) -> Self {
        self.on_create(Reply::Ok(CreateJobResponse {
            job,
            questions: None,
        }))
    }

    pub fn on_create_questions(self, job: ResearchJob, questions: &[&str]) -> Self {
        self.on_create(Reply::Ok(CreateJobResponse {
            job,
            questions: Some(questions.iter().map(|q| q.to_string()).collect()),
        }))
    }

    pub fn on_answer(self, reply: Reply<ResearchJob>) -> Self {
        self.answers.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_status(self, reply: Reply<ResearchJob>) -> Self {
        self.statuses.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_update(self, reply: Reply<ResearchJob>) -> Self {
        self.updates.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count()
    }

    pub fn answer_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Answer(_)))
            .count()
    }

    /// Status fetches addressed to `job_id`.
    pub fn status_calls(&self, job_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Get(r) if r.job_id.as_ref().map(|j| j.as_str()) == Some(job_id)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn next<T>(queue: &Mutex<VecDeque<Reply<T>>>, what: &'static str) -> Reply<T> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Fail(500, what))
    }
}

#[async_trait]
impl ResearchBackend for MockBackend {
    async fn create_job(&self, request: &JobRequest) -> DrkrResult<CreateJobResponse> {
        self.record(Call::Create(request.clone()));
        self.pause().await;
        Self::next(&self.creates, "no scripted create reply").into_result()
    }

    async fn get_job(&self, request: &GetJobRequest) -> DrkrResult<ResearchJob> {
        self.record(Call::Get(request.clone()));
        self.pause().await;
        let scripted = self.statuses.lock().unwrap().pop_front();
        let reply = match scripted {
            Some(reply) => reply,
            None => match self.last_status.lock().unwrap().clone() {
                Some(job) => Reply::Ok(job),
                None => Reply::Fail(500, "no scripted status reply"),
            },
        };
        if let Reply::Ok(job) = &reply {
            *self.last_status.lock().unwrap() = Some(job.clone());
        }
        reply.into_result()
    }

    async fn answer_job(&self, request: &AnswerRequest) -> DrkrResult<ResearchJob> {
        self.record(Call::Answer(request.clone()));
        self.pause().await;
        Self::next(&self.answers, "no scripted answer reply").into_result()
    }

    async fn update_job(&self, id: i64, request: &UpdateJobRequest) -> DrkrResult<ResearchJob> {
        self.record(Call::Update(id, request.clone()));
        self.pause().await;
        Self::next(&self.updates, "no scripted update reply").into_result()
    }

    async fn list_jobs(&self, query: &ListJobsQuery) -> DrkrResult<Vec<ResearchJob>> {
        self.record(Call::List(query.clone()));
        Ok(Vec::new())
    }

    async fn list_services(&self, service: Option<&str>) -> DrkrResult<Vec<ResearchService>> {
        self.record(Call::Services(service.map(str::to_string)));
        Ok(Vec::new())
    }
}
