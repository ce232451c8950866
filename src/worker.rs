//! The single sequential executor that drives jobs to completion.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::select;
use tokio::sync::Notify;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::WorkerError;
use crate::scheduler;
use crate::store::JobStore;
use crate::types::job::{Job, JobId};
use crate::types::states::JobState;

/// Performs the work a job describes. What that means is up to the
/// implementor; the worker only records the outcome.
///
/// Jobs may run more than once (a crash mid-execution re-queues the job on
/// the next start), so effects should be safe to repeat.
pub trait Executor: Send + Sync + 'static {
    /// Returns the job's result on success. An error, or a panic, marks the
    /// job `failed`.
    fn execute(
        &self,
        job: &Job,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// Stands in for real work: waits a fixed time and succeeds.
#[derive(Clone, Debug)]
pub struct SimulatedExecutor {
    pub work: Duration,
}

impl Executor for SimulatedExecutor {
    async fn execute(&self, _job: &Job) -> anyhow::Result<String> {
        sleep(self.work).await;
        Ok("Job completed successfully".into())
    }
}

pub struct Worker<S, E> {
    store: Arc<S>,
    executor: Arc<E>,
    idle_poll: Duration,
    wake: Arc<Notify>,
}

impl<S: JobStore + 'static, E: Executor> Worker<S, E> {
    pub fn new(store: Arc<S>, executor: E, idle_poll: Duration) -> Self {
        Self {
            store,
            executor: Arc::new(executor),
            idle_poll,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Shares a wake-up signal with submitters so an idle worker notices new
    /// jobs before its poll interval is up.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = wake;
        self
    }

    /// Puts every `running` job back to `queued`. Only a previous process
    /// can have left jobs running, since this one hasn't started any yet, so
    /// this must complete before `run`. Any error here should stop startup.
    pub fn recover(&self) -> Result<Vec<JobId>, WorkerError> {
        let orphans = self.store.list_by_state(JobState::Running)?;
        let now = Utc::now();

        let mut reclaimed = Vec::with_capacity(orphans.len());
        for mut job in orphans {
            job.reclaim(now)?;
            self.store.update(&job)?;
            warn!(job_id = job.id, "re-queued job orphaned by a previous run");
            reclaimed.push(job.id);
        }

        info!(reclaimed = reclaimed.len(), "recovery complete");
        Ok(reclaimed)
    }

    /// Runs the next queued job, if any, returning it in its final state.
    pub async fn run_once(&self) -> Result<Option<Job>, WorkerError> {
        let Some(mut job) = scheduler::next(&*self.store)? else {
            return Ok(None);
        };

        job.start(Utc::now())?;
        self.store.update(&job)?;

        self.process(job).await.map(Some)
    }

    #[instrument(name = "job", skip_all, fields(job_id = job.id, owner = %job.owner))]
    async fn process(&self, mut job: Job) -> Result<Job, WorkerError> {
        debug!("running");

        match self.execute(job.clone()).await {
            Ok(result) => {
                job.complete(result, Utc::now())?;
                info!("job done");
            },
            Err(error) => {
                warn!(%error, "job failed");
                job.fail(error, Utc::now())?;
            },
        }

        // The outcome only exists in memory until this write lands, and the
        // job shows as `running` in the meantime, so keep trying.
        while let Err(error) = self.store.update(&job) {
            error!(%error, "failed to record job outcome, retrying");
            sleep(self.idle_poll).await;
        }

        Ok(job)
    }

    /// Runs the executor on its own task so a panic is contained and reported
    /// as a failure of this job.
    async fn execute(&self, job: Job) -> Result<String, String> {
        let executor = self.executor.clone();
        match tokio::spawn(async move { executor.execute(&job).await }).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(format!("{error:#}")),
            Err(error) if error.is_panic() => {
                let panic = error.into_panic();
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                Err(format!("job panicked: {msg}"))
            },
            Err(error) => Err(error.to_string()),
        }
    }

    /// Processes jobs one at a time until `cancel` fires. When the queue is
    /// empty, waits for a wake-up or the poll interval, whichever comes first.
    /// Store failures abandon the current iteration; it's retried after the
    /// poll interval.
    ///
    /// A job still executing when `cancel` fires is left `running` and picked
    /// up by `recover` on the next start.
    pub async fn run(self, cancel: CancellationToken) {
        info!(idle_poll = ?self.idle_poll, "worker started");

        loop {
            let step = select! {
                step = self.run_once() => step,
                _ = cancel.cancelled() => break,
            };

            match step {
                Ok(Some(_)) => continue,
                Ok(None) => select! {
                    _ = self.wake.notified() => {},
                    _ = sleep(self.idle_poll) => {},
                    _ = cancel.cancelled() => break,
                },
                Err(error) => {
                    warn!(%error, "worker iteration failed");
                    select! {
                        _ = sleep(self.idle_poll) => {},
                        _ = cancel.cancelled() => break,
                    }
                },
            }
        }

        info!("worker stopped");
    }
}
