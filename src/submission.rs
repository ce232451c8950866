//! Accepting new work and answering status queries.
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::dashboard::{self, Dashboard};
use crate::error::{StoreError, SubmitError};
use crate::idempotency::{self, Resolution};
use crate::rate_limiter::RateLimiter;
use crate::store::JobStore;
use crate::types::job::{JobId, JobView, NewJob};
use crate::types::states::JobState;

/// Front door of the queue. Safe to share between any number of callers.
pub struct Submitter<S> {
    store: Arc<S>,
    limiter: RateLimiter,
    wake: Option<Arc<Notify>>,
}

impl<S: JobStore> Submitter<S> {
    pub fn new(store: Arc<S>, limiter: RateLimiter) -> Self {
        Self {
            store,
            limiter,
            wake: None,
        }
    }

    /// Signals `wake` whenever a runnable job is created.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Submits `payload` on behalf of `owner`.
    ///
    /// Content already known to the queue returns the existing job without
    /// touching the rate limiter. New content is checked against the limiter
    /// and always recorded: a rejected submission becomes a `failed` job
    /// whose error names the limit, so it still has an id to query.
    pub fn submit(
        &self,
        owner: &str,
        payload: &str,
    ) -> Result<JobView, SubmitError> {
        let Resolution {
            existing,
            fingerprint,
        } = idempotency::resolve(&*self.store, payload)?;

        if let Some(job) = existing {
            debug!(job_id = job.id, %owner, "duplicate submission");
            return Ok(job.view(true));
        }

        let admitted_at = Instant::now();
        let rejection = self.limiter.admit_at(owner, admitted_at).err();
        if let Some(reason) = rejection {
            info!(%owner, %reason, "submission rate limited");
        }
        // Quota goes back if this submission ends up without a job of its own.
        let refund = || {
            if rejection.is_none() {
                self.limiter.refund_at(owner, admitted_at);
            }
        };

        let new = NewJob {
            owner: owner.to_owned(),
            payload: payload.to_owned(),
            fingerprint: fingerprint.clone(),
            rejection: rejection.map(|r| r.to_string()),
        };

        match self.store.create_job(new) {
            Ok(job) => {
                info!(job_id = job.id, %owner, state = %job.state, "job created");
                if job.state == JobState::Queued {
                    if let Some(wake) = &self.wake {
                        wake.notify_one();
                    }
                }
                Ok(job.view(false))
            },
            // A concurrent submission of the same content got there first;
            // its job is the answer.
            Err(StoreError::Conflict(_)) => {
                refund();
                match self.store.find_by_fingerprint(&fingerprint)? {
                    Some(job) => {
                        debug!(job_id = job.id, %owner, "lost create race");
                        Ok(job.view(true))
                    },
                    None => {
                        warn!(%fingerprint, "conflicting job vanished");
                        Err(SubmitError::LostConflict(fingerprint))
                    },
                }
            },
            Err(error) => {
                refund();
                Err(error.into())
            },
        }
    }

    /// Current view of job `id`. Unknown ids get a `not_found` view rather
    /// than an error.
    pub fn status(&self, id: JobId) -> Result<JobView, SubmitError> {
        Ok(match self.store.get_job(id)? {
            Some(job) => job.view(false),
            None => JobView::not_found(id),
        })
    }

    pub fn dashboard(&self) -> Result<Dashboard, SubmitError> {
        Ok(dashboard::collect(&*self.store)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;
    use crate::types::job::Job;
    use crate::types::states::ViewState;

    fn submitter(global: u32, user: u32) -> Submitter<MemoryStore> {
        Submitter::new(
            Arc::new(MemoryStore::new()),
            RateLimiter::new(global, user, Duration::from_secs(60)),
        )
    }

    /// Delegates to a `MemoryStore`. Creates fail while `down` is set, and
    /// the next `hidden_lookups` fingerprint lookups miss, as they would for
    /// a submission racing an identical one.
    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryStore,
        down: AtomicBool,
        hidden_lookups: AtomicU32,
    }

    impl JobStore for FaultyStore {
        fn create_job(&self, new: NewJob) -> Result<Job, StoreError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("down".into()));
            }
            self.inner.create_job(new)
        }

        fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
            self.inner.get_job(id)
        }

        fn find_by_fingerprint(
            &self,
            fingerprint: &str,
        ) -> Result<Option<Job>, StoreError> {
            let left = self.hidden_lookups.load(Ordering::SeqCst);
            if left > 0 {
                self.hidden_lookups.store(left - 1, Ordering::SeqCst);
                return Ok(None);
            }
            self.inner.find_by_fingerprint(fingerprint)
        }

        fn list_by_state(
            &self,
            state: JobState,
        ) -> Result<Vec<Job>, StoreError> {
            self.inner.list_by_state(state)
        }

        fn list_all(&self) -> Result<Vec<Job>, StoreError> {
            self.inner.list_all()
        }

        fn update(&self, job: &Job) -> Result<(), StoreError> {
            self.inner.update(job)
        }
    }

    fn faulty(user: u32) -> Submitter<FaultyStore> {
        Submitter::new(
            Arc::new(FaultyStore::default()),
            RateLimiter::new(100, user, Duration::from_secs(60)),
        )
    }

    #[test]
    fn same_payload_same_job() {
        let s = submitter(100, 10);

        let first = s.submit("alice", "resize image 1").unwrap();
        assert!(!first.is_duplicate);
        assert_eq!(first.state, ViewState::Queued);

        let again = s.submit("alice", "resize image 1").unwrap();
        let other_owner = s.submit("bob", "resize image 1").unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(other_owner.id, first.id);
        assert!(again.is_duplicate && other_owner.is_duplicate);
        assert_eq!(again.fingerprint, first.fingerprint);

        let different = s.submit("alice", "resize image 2").unwrap();
        assert_ne!(different.id, first.id);
        assert_eq!(s.store.list_all().unwrap().len(), 2);
    }

    #[test]
    fn user_limit_yields_failed_job() {
        let s = submitter(100, 2);

        s.submit("alice", "a").unwrap();
        s.submit("alice", "b").unwrap();
        let third = s.submit("alice", "c").unwrap();

        assert_eq!(third.state, ViewState::Failed);
        assert_eq!(third.error.as_deref(), Some("user_limit_exceeded"));
        assert!(!third.is_duplicate);

        // The rejected job is stored and queryable, but never queued.
        assert_eq!(s.status(third.id).unwrap(), third);
        assert_eq!(s.store.list_by_state(JobState::Queued).unwrap().len(), 2);

        // Someone else is still welcome.
        assert_eq!(s.submit("bob", "d").unwrap().state, ViewState::Queued);
    }

    #[test]
    fn global_limit_yields_failed_job() {
        let s = submitter(3, 10);

        for (owner, payload) in [("a", "1"), ("b", "2"), ("c", "3")] {
            assert_eq!(s.submit(owner, payload).unwrap().state, ViewState::Queued);
        }
        let fourth = s.submit("d", "4").unwrap();
        assert_eq!(fourth.state, ViewState::Failed);
        assert_eq!(fourth.error.as_deref(), Some("global_limit_exceeded"));
    }

    #[test]
    fn duplicates_skip_the_limiter() {
        let s = submitter(100, 1);

        let first = s.submit("alice", "a").unwrap();
        // alice is out of quota, but known content still resolves.
        for _ in 0..5 {
            let dup = s.submit("alice", "a").unwrap();
            assert_eq!(dup.id, first.id);
            assert_eq!(dup.state, ViewState::Queued);
        }

        // And the duplicates didn't eat into anyone's quota.
        assert_eq!(s.submit("bob", "b").unwrap().state, ViewState::Queued);
    }

    #[test]
    fn rejected_content_stays_rejected() {
        let s = submitter(100, 1);

        s.submit("alice", "a").unwrap();
        let rejected = s.submit("alice", "b").unwrap();
        assert_eq!(rejected.state, ViewState::Failed);

        // The failed record owns the fingerprint from now on.
        let retry = s.submit("bob", "b").unwrap();
        assert_eq!(retry.id, rejected.id);
        assert!(retry.is_duplicate);
        assert_eq!(retry.state, ViewState::Failed);
    }

    #[test]
    fn window_rollover_readmits() {
        let window = Duration::from_millis(100);
        let s = Submitter::new(
            Arc::new(MemoryStore::new()),
            RateLimiter::starting_at(100, 1, window, Instant::now()),
        );

        assert_eq!(s.submit("alice", "a").unwrap().state, ViewState::Queued);
        assert_eq!(s.submit("alice", "b").unwrap().state, ViewState::Failed);

        thread::sleep(window + Duration::from_millis(20));
        assert_eq!(s.submit("alice", "c").unwrap().state, ViewState::Queued);
    }

    #[test]
    fn unavailable_store_aborts_submission() {
        let s = faulty(1);
        s.store.down.store(true, Ordering::SeqCst);

        assert!(matches!(
            s.submit("alice", "a"),
            Err(SubmitError::Store(StoreError::Unavailable(_)))
        ));
        assert!(s.store.list_all().unwrap().is_empty());

        // The aborted attempt didn't use up alice's only admission.
        s.store.down.store(false, Ordering::SeqCst);
        let view = s.submit("alice", "a").unwrap();
        assert_eq!(view.state, ViewState::Queued);
        assert!(!view.is_duplicate);
    }

    #[test]
    fn losing_create_race_is_free() {
        let s = faulty(1);
        let winner = s.submit("bob", "a").unwrap();

        // alice's lookup misses, so she is admitted and then loses the create.
        s.store.hidden_lookups.store(1, Ordering::SeqCst);
        let dup = s.submit("alice", "a").unwrap();
        assert_eq!(dup.id, winner.id);
        assert!(dup.is_duplicate);

        assert_eq!(s.submit("alice", "b").unwrap().state, ViewState::Queued);
    }

    #[test]
    fn unknown_status_is_not_found() {
        let s = submitter(100, 10);
        let view = s.status(12345).unwrap();
        assert_eq!(view.state, ViewState::NotFound);
        assert_eq!(view.id, 12345);
    }

    #[test]
    fn concurrent_identical_submissions() {
        const N: usize = 32;

        let s = Arc::new(submitter(1000, 1000));
        let barrier = Arc::new(Barrier::new(N));

        let handles: Vec<_> = (0..N)
            .map(|n| {
                let s = s.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    s.submit(&format!("owner-{n}"), "the same payload").unwrap()
                })
            })
            .collect();

        let views: Vec<JobView> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(views.len(), N);
        assert!(views.iter().all(|v| v.id == views[0].id));
        assert_eq!(views.iter().filter(|v| !v.is_duplicate).count(), 1);
        assert_eq!(s.store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn new_work_wakes_worker() {
        let wake = Arc::new(Notify::new());
        let s = submitter(100, 10).with_wake(wake.clone());

        s.submit("alice", "a").unwrap();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            tokio::time::timeout(Duration::from_secs(1), wake.notified())
                .await
                .expect("submission should leave a wake-up permit");
        });
    }
}
