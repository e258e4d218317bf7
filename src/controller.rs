//! The research job lifecycle controller.
//!
//! A [`JobController`] drives one research job from submission, through an
//! optional clarification round, to a terminal status:
//!
//! ```text
//!            submit()                questions            submit_answers()
//!   Idle ──────────────→ Submitting ───────────→ AwaitingAnswers ───────────→ SubmittingAnswers
//!    ↑                       │  │                      ↑                          │   │
//!    │           failure ────┘  │ no questions         └──────── failure ─────────┘   │ success
//!    │                          ↓                                                     ↓
//!    │                       Polling ←────────────────────────────────────────────────┘
//!    │                        │   │
//!    │          fetch error ──┘   └── terminal status ──→ Terminal
//!    │                ↓
//!    │              Error
//!    └──── cancel() from any phase
//! ```
//!
//! **Invariants:**
//! - At most one request of the workflow is in flight; a second `submit` or
//!   `submit_answers` during `Submitting`/`SubmittingAnswers` fails with
//!   [`DrkrError::Busy`] without touching the network.
//! - At most one [`PollSession`] exists; starting one stops the previous
//!   session first.
//! - The cached job is replaced wholesale by every fetch and never moves
//!   from a terminal status back to a live one.
//! - Results of requests issued before a `cancel()` are discarded.
//! - A failed `submit` restores the phase, round and poll session it
//!   started from.
//! - Dropping the controller stops polling.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::ResearchBackend;
use crate::config::{ClientConfig, DEFAULT_POLL_INTERVAL_SECS};
use crate::error::{DrkrError, DrkrResult};
use crate::job::ResearchJob;
use crate::poll::PollSession;
use crate::request::{ClarificationRound, GetJobRequest, JobRequest};

/// Controller phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Idle,
    Submitting,
    AwaitingAnswers,
    SubmittingAnswers,
    Polling,
    /// The job reached `completed`, `failed` or `cancelled`.
    Terminal,
    /// Polling failed; only an explicit retry leaves this phase.
    Error,
}

impl Phase {
    /// Whether a create or answer request is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Phase::Submitting | Phase::SubmittingAnswers)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Submitting => "submitting",
            Phase::AwaitingAnswers => "awaiting_answers",
            Phase::SubmittingAnswers => "submitting_answers",
            Phase::Polling => "polling",
            Phase::Terminal => "terminal",
            Phase::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful [`JobController::submit`] led to.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The backend asked follow-up questions.
    Clarification(ClarificationRound),
    /// The job was accepted and is being polled.
    Polling(ResearchJob),
}

/// Everything a presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSnapshot {
    pub phase: Phase,
    /// Last-known job; kept on errors so it stays visible.
    pub job: Option<ResearchJob>,
    pub clarification: Option<ClarificationRound>,
    /// Dismissible notification text.
    pub last_error: Option<String>,
}

#[derive(Default)]
struct State {
    phase: Phase,
    job: Option<ResearchJob>,
    clarification: Option<ClarificationRound>,
    last_error: Option<String>,
    poll: Option<PollSession>,
    next_generation: u64,
    /// Bumped by `cancel()`; in-flight requests compare it on completion.
    epoch: u64,
}

impl State {
    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            phase: self.phase,
            job: self.job.clone(),
            clarification: self.clarification.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn stop_poll(&mut self) {
        if let Some(mut session) = self.poll.take() {
            session.stop();
        }
    }

    fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(PollSession::is_active)
    }
}

struct Inner<B: ?Sized> {
    state: Mutex<State>,
    updates: watch::Sender<ControllerSnapshot>,
    poll_interval: Duration,
    backend: Arc<B>,
}

impl<B: ResearchBackend + ?Sized + 'static> Inner<B> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.updates.send_replace(state.snapshot());
    }

    /// One poll tick: fetch, then apply the result if the session is still
    /// the live one.
    async fn poll_tick(&self, generation: u64, request: &GetJobRequest) -> ControlFlow<()> {
        debug!(job = %request.describe(), generation, "polling job status");
        let result = self.backend.get_job(request).await;

        let mut state = self.lock();
        if state.poll.as_ref().map(PollSession::generation) != Some(generation) {
            debug!(generation, "discarding result of stopped poll session");
            return ControlFlow::Break(());
        }

        match result {
            Ok(job) => {
                let status = job.status;
                state.job = Some(job);
                if status.is_terminal() {
                    info!(job = %request.describe(), %status, "job reached terminal status");
                    state.phase = Phase::Terminal;
                    if let Some(session) = state.poll.take() {
                        session.finish();
                    }
                    self.publish(&state);
                    ControlFlow::Break(())
                } else {
                    self.publish(&state);
                    ControlFlow::Continue(())
                }
            }
            Err(err) => {
                warn!(job = %request.describe(), error = %err, "status poll failed, polling stopped");
                state.phase = Phase::Error;
                state.last_error = Some(err.user_message());
                if let Some(session) = state.poll.take() {
                    session.finish();
                }
                self.publish(&state);
                ControlFlow::Break(())
            }
        }
    }
}

/// Drives one research job workflow against a [`ResearchBackend`].
///
/// Share it behind an `Arc` if several tasks need to call it; all methods
/// take `&self`.
pub struct JobController<B: ResearchBackend + ?Sized + 'static> {
    inner: Arc<Inner<B>>,
}

impl<B: ResearchBackend + ?Sized + 'static> JobController<B> {
    /// Create a controller polling every 5 seconds.
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_poll_interval(backend, Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))
    }

    pub fn with_poll_interval(backend: Arc<B>, poll_interval: Duration) -> Self {
        let (updates, _) = watch::channel(ControllerSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                updates,
                poll_interval,
                backend,
            }),
        }
    }

    pub fn from_config(backend: Arc<B>, config: &ClientConfig) -> Self {
        Self::with_poll_interval(backend, config.poll_interval())
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.inner.lock().snapshot()
    }

    /// Receive a snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    pub fn job(&self) -> Option<ResearchJob> {
        self.inner.lock().job.clone()
    }

    /// Whether a poll session is currently active.
    pub fn is_polling(&self) -> bool {
        self.inner.lock().is_polling()
    }

    /// Create a job.
    ///
    /// Sends exactly one create request. Accepted from any phase except
    /// while another request is in flight. A previous clarification round or
    /// poll session is suspended while the request runs; it is discarded on
    /// success and restored if the request fails.
    pub async fn submit(&self, request: JobRequest) -> DrkrResult<SubmitOutcome> {
        request.validate()?;

        let (epoch, prior_phase, prior_round) = {
            let mut state = self.inner.lock();
            if state.phase.is_in_flight() {
                return Err(DrkrError::Busy(state.phase));
            }
            let prior_phase = state.phase;
            let prior_round = state.clarification.take();
            state.stop_poll();
            state.last_error = None;
            state.phase = Phase::Submitting;
            self.inner.publish(&state);
            (state.epoch, prior_phase, prior_round)
        };

        info!(service = %request.service, model = %request.model, "submitting research job");
        let result = self.inner.backend.create_job(&request).await;

        let mut state = self.inner.lock();
        if state.epoch != epoch {
            debug!("discarding create response after cancel");
            return Err(DrkrError::Cancelled);
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, phase = %prior_phase, "job creation failed, restoring previous phase");
                state.clarification = prior_round;
                state.last_error = Some(err.user_message());
                match (prior_phase, state.job.clone()) {
                    (Phase::Polling, Some(job)) => {
                        if let Err(resume) = self.start_polling_locked(&mut state, job) {
                            warn!(error = %resume, "could not resume polling");
                        }
                    }
                    _ => {
                        state.phase = prior_phase;
                        self.inner.publish(&state);
                    }
                }
                return Err(err);
            }
        };

        if let Some(questions) = response.pending_questions() {
            info!(job = %response.job.job_id, questions = questions.len(), "backend asked follow-up questions");
            let round = ClarificationRound::new(response.job.clone(), questions.to_vec());
            state.job = Some(response.job);
            state.clarification = Some(round.clone());
            state.phase = Phase::AwaitingAnswers;
            self.inner.publish(&state);
            return Ok(SubmitOutcome::Clarification(round));
        }

        let job = response.job;
        info!(job = %job.job_id, status = %job.status, "job accepted");
        self.start_polling_locked(&mut state, job.clone())?;
        Ok(SubmitOutcome::Polling(job))
    }

    /// Answer the follow-up questions of the pending round.
    ///
    /// Blank answers are rejected before anything is sent. On failure the
    /// round (with the given answers) stays pending so the user can retry.
    pub async fn submit_answers(&self, round: ClarificationRound) -> DrkrResult<ResearchJob> {
        let answer = round.to_answer_request()?;

        let epoch = {
            let mut state = self.inner.lock();
            match state.phase {
                Phase::AwaitingAnswers => {}
                phase if phase.is_in_flight() => return Err(DrkrError::Busy(phase)),
                phase => {
                    return Err(DrkrError::InvalidState(format!(
                        "no clarification round pending ({phase})"
                    )));
                }
            }
            let pending = state.clarification.as_ref().map(|r| &r.job().job_id);
            if pending != Some(&round.job().job_id) {
                return Err(DrkrError::InvalidState(format!(
                    "round belongs to job {}, not the pending one",
                    round.job().job_id
                )));
            }
            state.clarification = Some(round);
            state.last_error = None;
            state.phase = Phase::SubmittingAnswers;
            self.inner.publish(&state);
            state.epoch
        };

        info!(job = %answer.job_id, answers = answer.answers.len(), "submitting answers");
        let result = self.inner.backend.answer_job(&answer).await;

        let mut state = self.inner.lock();
        if state.epoch != epoch {
            debug!("discarding answer response after cancel");
            return Err(DrkrError::Cancelled);
        }

        match result {
            Ok(job) => {
                state.clarification = None;
                self.start_polling_locked(&mut state, job.clone())?;
                Ok(job)
            }
            Err(err) => {
                warn!(job = %answer.job_id, error = %err, "answer submission failed");
                state.phase = Phase::AwaitingAnswers;
                state.last_error = Some(err.user_message());
                self.inner.publish(&state);
                Err(err)
            }
        }
    }

    /// Poll `job` until it reaches a terminal status.
    ///
    /// Any active session is stopped first. A job that is already terminal
    /// is cached and nothing is polled.
    pub fn start_polling(&self, job: ResearchJob) -> DrkrResult<()> {
        let mut state = self.inner.lock();
        if state.phase.is_in_flight() {
            return Err(DrkrError::Busy(state.phase));
        }
        state.clarification = None;
        self.start_polling_locked(&mut state, job)
    }

    fn start_polling_locked(&self, state: &mut State, job: ResearchJob) -> DrkrResult<()> {
        state.stop_poll();

        if job.is_terminal() {
            state.job = Some(job);
            state.phase = Phase::Terminal;
            self.inner.publish(state);
            return Ok(());
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let request = GetJobRequest::for_job(&job);
        let inner = Arc::clone(&self.inner);
        let session = PollSession::spawn(
            job.job_id.clone(),
            generation,
            self.inner.poll_interval,
            move || {
                let inner = Arc::clone(&inner);
                let request = request.clone();
                async move { inner.poll_tick(generation, &request).await }
            },
        );

        state.job = Some(job);
        match session {
            Ok(session) => {
                state.poll = Some(session);
                state.phase = Phase::Polling;
                self.inner.publish(state);
                Ok(())
            }
            Err(err) => {
                state.phase = Phase::Error;
                state.last_error = Some(err.user_message());
                self.inner.publish(state);
                Err(err)
            }
        }
    }

    /// Restart polling the cached job after a poll failure.
    pub fn resume_polling(&self) -> DrkrResult<()> {
        let mut state = self.inner.lock();
        if state.phase != Phase::Error {
            return Err(DrkrError::InvalidState(format!(
                "nothing to resume ({})",
                state.phase
            )));
        }
        let job = state
            .job
            .clone()
            .ok_or_else(|| DrkrError::InvalidState("no job to poll".into()))?;
        state.last_error = None;
        self.start_polling_locked(&mut state, job)
    }

    /// Stop polling. Idempotent; the cached job stays.
    pub fn stop_polling(&self) {
        let mut state = self.inner.lock();
        let was_polling = state.poll.is_some();
        state.stop_poll();
        if state.phase == Phase::Polling {
            state.phase = Phase::Idle;
        }
        if was_polling {
            self.inner.publish(&state);
        }
    }

    /// Tear the workflow down: stop polling, drop the pending round and the
    /// cached job, and return to `Idle`. Responses still in flight are
    /// discarded when they arrive.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.stop_poll();
        state.epoch += 1;
        state.phase = Phase::Idle;
        state.job = None;
        state.clarification = None;
        state.last_error = None;
        self.inner.publish(&state);
        debug!("workflow cancelled");
    }

    /// Ask the backend to cancel the current job.
    ///
    /// On success the returned job replaces the cached one, unless polling
    /// already saw a terminal status while the request ran; the reply is
    /// then only returned. A terminal reply ends polling and any pending
    /// clarification round. On failure
    /// the controller keeps its phase and records the error.
    pub async fn cancel_job(&self) -> DrkrResult<ResearchJob> {
        let (job, epoch) = {
            let state = self.inner.lock();
            if state.phase.is_in_flight() {
                return Err(DrkrError::Busy(state.phase));
            }
            let job = state
                .job
                .clone()
                .ok_or_else(|| DrkrError::InvalidState("no job to cancel".into()))?;
            if !job.can_be_cancelled() {
                return Err(DrkrError::InvalidState(format!(
                    "job {} is already {}",
                    job.job_id, job.status
                )));
            }
            (job, state.epoch)
        };

        info!(job = %job.job_id, "cancelling job");
        let result = self.inner.backend.cancel_job(&job).await;

        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return Err(DrkrError::Cancelled);
        }
        let current = state.job.as_ref().map(|j| j.job_id.clone());

        match result {
            Ok(updated) => {
                let settled = state.phase == Phase::Terminal
                    || state.job.as_ref().is_some_and(ResearchJob::is_terminal);
                if settled {
                    debug!(job = %updated.job_id, status = %updated.status, "job already terminal, cancel reply not applied");
                } else if current.as_ref() == Some(&updated.job_id) {
                    if updated.is_terminal() {
                        state.stop_poll();
                        state.clarification = None;
                        state.phase = Phase::Terminal;
                    }
                    state.job = Some(updated.clone());
                    self.inner.publish(&state);
                }
                Ok(updated)
            }
            Err(err) => {
                warn!(job = %job.job_id, error = %err, "cancel request failed");
                state.last_error = Some(err.user_message());
                self.inner.publish(&state);
                Err(err)
            }
        }
    }

    /// Clear the current notification.
    pub fn dismiss_error(&self) {
        let mut state = self.inner.lock();
        if state.last_error.take().is_some() {
            self.inner.publish(&state);
        }
    }
}

impl<B: ResearchBackend + ?Sized + 'static> Drop for JobController<B> {
    fn drop(&mut self) {
        self.inner.lock().stop_poll();
    }
}
