// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Background Worker Pipeline
//!
//! One [`Worker`] per job kind: a single-threaded polling coordinator plus
//! up to N parallel tasks governed by a weighted semaphore.
//!
//! ## Run Loop
//!
//! 1. Wait for the next tick or the stop signal.
//! 2. List pending jobs through the service-scoped registries.
//! 3. Per job: acquire one semaphore permit (blocking - this is the
//!    backpressure), then launch a task that CAS-claims the job
//!    (Pending -> InProgress, skipping if another worker won), executes the
//!    body with the stop channel, and records failure on error. The body
//!    owns its success transition so a completed commit is never overwritten.
//!
//! ## Lifecycle
//!
//! `start` is idempotent; `stop` is idempotent, safe to call before
//! `start`, and waits for outstanding tasks before returning. A task that
//! observes the stop signal leaves its job either Completed (commit already
//! happened) or Failed with reason `cancelled`.
//!
//! Within one worker kind jobs are picked in repository order; across kinds
//! there is no ordering. Workers never panic on a job failure: the error
//! kind and message are recorded and the loop continues.

pub mod export_worker;
pub mod restore_worker;
pub mod thumbnail_worker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use stockroom_domain::entities::JobKind;
use stockroom_domain::{DomainError, DomainResult, EntityId};

/// Per-kind job handling plugged into the generic [`Worker`].
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    /// The job row this processor consumes.
    type Job: Clone + Send + Sync + 'static;

    /// Worker kind, used for logging and slot accounting.
    fn kind(&self) -> JobKind;

    fn job_id(&self, job: &Self::Job) -> EntityId;

    /// Pending jobs in repository order (service scope).
    async fn pending(&self) -> DomainResult<Vec<Self::Job>>;

    /// Claims the job (CAS Pending -> InProgress plus any slot
    /// acquisition). `Ok(false)` leaves the job for a later tick.
    async fn claim(&self, job: &Self::Job) -> DomainResult<bool>;

    /// Executes the job body. Must observe `stop` at suspension points and
    /// is responsible for persisting its own Completed state; an error
    /// return is recorded via [`JobProcessor::fail`].
    async fn execute(&self, job: &Self::Job, stop: watch::Receiver<bool>) -> DomainResult<()>;

    /// Records a failure: transition to Failed (or requeue) and release any
    /// held resources.
    async fn fail(&self, job: &Self::Job, error: &DomainError) -> DomainResult<()>;
}

struct WorkerState {
    running: bool,
    stop_tx: Option<watch::Sender<bool>>,
    coordinator: Option<JoinHandle<()>>,
}

/// Polling worker for one job kind.
pub struct Worker<P: JobProcessor> {
    processor: Arc<P>,
    poll_interval: Duration,
    semaphore: Arc<Semaphore>,
    state: Mutex<WorkerState>,
}

impl<P: JobProcessor> Worker<P> {
    /// Creates a stopped worker.
    ///
    /// `max_concurrent` bounds the parallel tasks of this kind; the default
    /// poll interval is 10 seconds unless configuration overrides it.
    pub fn new(processor: P, poll_interval: Duration, max_concurrent: usize) -> Self {
        Self {
            processor: Arc::new(processor),
            poll_interval,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            state: Mutex::new(WorkerState {
                running: false,
                stop_tx: None,
                coordinator: None,
            }),
        }
    }

    /// Starts the coordinator; calling an already-started worker is a no-op.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.running {
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let processor = self.processor.clone();
        let semaphore = self.semaphore.clone();
        let poll_interval = self.poll_interval;
        let handle = tokio::spawn(run_loop(processor, semaphore, poll_interval, stop_rx));
        state.running = true;
        state.stop_tx = Some(stop_tx);
        state.coordinator = Some(handle);
        info!(kind = self.processor.kind().as_str(), "worker started");
    }

    /// Stops the coordinator and waits for in-flight tasks.
    ///
    /// Idempotent and safe to call before `start`.
    pub async fn stop(&self) {
        let (stop_tx, coordinator) = {
            let mut state = self.state.lock();
            (state.stop_tx.take(), state.coordinator.take())
        };
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(true);
        }
        if let Some(coordinator) = coordinator {
            if let Err(e) = coordinator.await {
                error!(kind = self.processor.kind().as_str(), error = %e, "coordinator join failed");
            }
        }
        let mut state = self.state.lock();
        state.running = false;
        info!(kind = self.processor.kind().as_str(), "worker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

async fn run_loop<P: JobProcessor>(
    processor: Arc<P>,
    semaphore: Arc<Semaphore>,
    poll_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let kind = processor.kind();
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut tasks: JoinSet<()> = JoinSet::new();

    'coordinator: loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = stop_rx.changed() => break 'coordinator,
        }

        let jobs = match processor.pending().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(kind = kind.as_str(), error = %e, "polling pending jobs failed");
                continue;
            }
        };

        for job in jobs {
            // The producer blocks here when the semaphore is saturated.
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break 'coordinator,
                },
                _ = stop_rx.changed() => break 'coordinator,
            };

            let processor = processor.clone();
            let stop = stop_rx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let job_id = processor.job_id(&job);
                match processor.claim(&job).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(kind = kind.as_str(), job = %job_id, "claim lost or deferred");
                        return;
                    }
                    Err(e) => {
                        warn!(kind = kind.as_str(), job = %job_id, error = %e, "claim failed");
                        return;
                    }
                }
                match processor.execute(&job, stop).await {
                    Ok(()) => debug!(kind = kind.as_str(), job = %job_id, "job completed"),
                    Err(e) => {
                        warn!(
                            kind = kind.as_str(),
                            job = %job_id,
                            category = e.category(),
                            error = %e,
                            "job failed"
                        );
                        if let Err(record_err) = processor.fail(&job, &e).await {
                            error!(
                                kind = kind.as_str(),
                                job = %job_id,
                                error = %record_err,
                                "recording job failure failed"
                            );
                        }
                    }
                }
            });
        }

        // Reap finished tasks without blocking the poll cadence.
        while tasks.try_join_next().is_some() {}
    }

    // Drain outstanding tasks before reporting quiescence.
    while tasks.join_next().await.is_some() {}
    debug!(kind = kind.as_str(), "coordinator quiescent");
}

/// Returns a cancellation error when the stop signal is set.
pub(crate) fn check_stop(stop: &watch::Receiver<bool>) -> DomainResult<()> {
    if *stop.borrow() {
        return Err(DomainError::cancelled("cancelled"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct CountingJob {
        id: EntityId,
    }

    struct CountingProcessor {
        jobs: Mutex<Vec<CountingJob>>,
        executed: AtomicUsize,
        failed: AtomicUsize,
    }

    impl CountingProcessor {
        fn new(job_count: usize) -> Self {
            Self {
                jobs: Mutex::new(
                    (0..job_count)
                        .map(|_| CountingJob { id: EntityId::new() })
                        .collect(),
                ),
                executed: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl JobProcessor for CountingProcessor {
        type Job = CountingJob;

        fn kind(&self) -> JobKind {
            JobKind::Thumbnail
        }

        fn job_id(&self, job: &Self::Job) -> EntityId {
            job.id.clone()
        }

        async fn pending(&self) -> DomainResult<Vec<Self::Job>> {
            Ok(std::mem::take(&mut *self.jobs.lock()))
        }

        async fn claim(&self, _job: &Self::Job) -> DomainResult<bool> {
            Ok(true)
        }

        async fn execute(&self, _job: &Self::Job, _stop: watch::Receiver<bool>) -> DomainResult<()> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fail(&self, _job: &Self::Job, _error: &DomainError) -> DomainResult<()> {
            self.failed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let worker = Worker::new(CountingProcessor::new(0), Duration::from_millis(10), 2);
        worker.stop().await;
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn start_and_double_stop_are_idempotent() {
        let worker = Worker::new(CountingProcessor::new(0), Duration::from_millis(10), 2);
        worker.start();
        worker.start();
        assert!(worker.is_running());
        worker.stop().await;
        worker.stop().await;
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn pending_jobs_are_executed() {
        let worker = Worker::new(CountingProcessor::new(3), Duration::from_millis(5), 2);
        worker.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.stop().await;
        assert_eq!(worker.processor.executed.load(Ordering::SeqCst), 3);
        assert_eq!(worker.processor.failed.load(Ordering::SeqCst), 0);
    }

    struct FailingProcessor {
        inner: CountingProcessor,
    }

    #[async_trait]
    impl JobProcessor for FailingProcessor {
        type Job = CountingJob;

        fn kind(&self) -> JobKind {
            JobKind::Export
        }

        fn job_id(&self, job: &Self::Job) -> EntityId {
            job.id.clone()
        }

        async fn pending(&self) -> DomainResult<Vec<Self::Job>> {
            self.inner.pending().await
        }

        async fn claim(&self, _job: &Self::Job) -> DomainResult<bool> {
            Ok(true)
        }

        async fn execute(&self, _job: &Self::Job, _stop: watch::Receiver<bool>) -> DomainResult<()> {
            Err(DomainError::storage("blob unavailable"))
        }

        async fn fail(&self, job: &Self::Job, error: &DomainError) -> DomainResult<()> {
            assert_eq!(error.category(), "storage");
            self.inner.fail(job, error).await
        }
    }

    #[tokio::test]
    async fn failures_are_recorded_and_the_loop_continues() {
        let worker = Worker::new(
            FailingProcessor {
                inner: CountingProcessor::new(2),
            },
            Duration::from_millis(5),
            1,
        );
        worker.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.stop().await;
        assert_eq!(worker.processor.inner.failed.load(Ordering::SeqCst), 2);
    }
}
