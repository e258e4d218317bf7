//! The status polling task.
//!
//! A [`PollSession`] owns exactly one spawned task that runs a tick
//! callback on a fixed interval until the callback breaks, the session is
//! stopped, or the session is dropped.
//!
//! ```text
//!   spawn ──→ wait(interval) ──→ tick() ──Continue──→ wait(interval) …
//!                 │                 │
//!                 │                 └──Break──→ finished
//!                 └──stop()/drop──→ cancelled (in-flight tick dropped)
//! ```
//!
//! **Invariants:**
//! - The first tick fires one full interval after spawn.
//! - Ticks never overlap: the next wait starts after the tick completes,
//!   and ticks missed while a slow tick ran are skipped, not queued.
//! - `stop()` is idempotent and synchronous: no tick starts after it returns.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DrkrError, DrkrResult};
use crate::job::JobId;

/// Handle to a running poll loop.
#[derive(Debug)]
pub struct PollSession {
    job_id: JobId,
    generation: u64,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PollSession {
    /// Spawn a poll loop on the current Tokio runtime.
    ///
    /// `generation` tags the session so that a tick can tell whether it
    /// still belongs to the live session before applying its result.
    pub fn spawn<F, Fut>(
        job_id: JobId,
        generation: u64,
        interval: Duration,
        mut tick: F,
    ) -> DrkrResult<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(DrkrError::Configuration(
                "poll interval must be non-zero".into(),
            ));
        }
        let runtime = Handle::try_current()
            .map_err(|_| DrkrError::InvalidState("polling requires a Tokio runtime".into()))?;

        let token = CancellationToken::new();
        let task_token = token.clone();
        let task_job = job_id.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let flow = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    flow = tick() => flow,
                };
                if flow.is_break() {
                    break;
                }
            }

            task_token.cancel();
            debug!(job = %task_job, generation, "poll loop exited");
        });

        debug!(job = %job_id, generation, ?interval, "poll loop started");
        Ok(Self {
            job_id,
            generation,
            token,
            handle: Some(handle),
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the loop may still run another tick.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop the loop. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(job = %self.job_id, generation = self.generation, "poll loop stopped");
        }
    }

    /// Mark the session finished from inside its own tick.
    ///
    /// Unlike [`stop`](Self::stop) this does not abort the task, which is
    /// about to return on its own.
    pub fn finish(mut self) {
        self.token.cancel();
        self.handle.take();
    }
}

impl Drop for PollSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const INTERVAL: Duration = Duration::from_secs(5);

    fn counting_session(counter: Arc<AtomicUsize>, stop_after: usize) -> PollSession {
        PollSession::spawn(JobId::from("J1"), 1, INTERVAL, move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= stop_after {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let _session = counting_session(Arc::clone(&ticks), usize::MAX);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_session() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let session = counting_session(Arc::clone(&ticks), 2);

        tokio::time::sleep(INTERVAL * 10).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(!session.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut session = counting_session(Arc::clone(&ticks), usize::MAX);

        tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;
        session.stop();
        session.stop();
        assert!(!session.is_active());

        tokio::time::sleep(INTERVAL * 4).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        drop(counting_session(Arc::clone(&ticks), usize::MAX));

        tokio::time::sleep(INTERVAL * 4).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_never_overlap() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let (r, m) = (Arc::clone(&running), Arc::clone(&max_seen));

        let _session = PollSession::spawn(JobId::from("J1"), 1, INTERVAL, move || {
            let (running, max_seen) = (Arc::clone(&r), Arc::clone(&m));
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(INTERVAL * 3).await;
                running.fetch_sub(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        })
        .unwrap();

        tokio::time::sleep(INTERVAL * 20).await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let result = PollSession::spawn(JobId::from("J1"), 1, INTERVAL, || async {
            ControlFlow::Break(())
        });
        assert!(matches!(result, Err(DrkrError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let result = PollSession::spawn(JobId::from("J1"), 1, Duration::ZERO, || async {
            ControlFlow::Break(())
        });
        assert!(matches!(result, Err(DrkrError::Configuration(_))));
    }
}
