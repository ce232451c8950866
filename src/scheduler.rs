//! Picks the next job to run.
use crate::error::StoreError;
use crate::store::JobStore;
use crate::types::job::Job;
use crate::types::states::JobState;

/// Returns the queued job with the smallest `(last_served, id)`, where a
/// missing `last_served` sorts before any timestamp. For jobs that have never
/// run this is plain FIFO by id. `None` means there's nothing to do.
pub fn next<S: JobStore + ?Sized>(store: &S) -> Result<Option<Job>, StoreError> {
    Ok(store
        .list_by_state(JobState::Queued)?
        .into_iter()
        .min_by_key(|j| (j.last_served, j.id)))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::store::MemoryStore;
    use crate::types::job::NewJob;

    fn submit(store: &MemoryStore, payload: &str) -> Job {
        store
            .create_job(NewJob {
                owner: "alice".into(),
                payload: payload.into(),
                fingerprint: payload.into(),
                rejection: None,
            })
            .unwrap()
    }

    #[test]
    fn idle_when_empty() {
        let store = MemoryStore::new();
        assert!(next(&store).unwrap().is_none());
    }

    #[test]
    fn fifo_by_id() {
        let store = MemoryStore::new();
        let j1 = submit(&store, "j1");
        let j2 = submit(&store, "j2");
        let j3 = submit(&store, "j3");

        for expected in [j1, j2, j3] {
            let mut job = next(&store).unwrap().unwrap();
            assert_eq!(job.id, expected.id);

            job.start(Utc::now()).unwrap();
            store.update(&job).unwrap();
            assert_ne!(next(&store).unwrap().map(|j| j.id), Some(job.id));

            job.complete("ok".into(), Utc::now()).unwrap();
            store.update(&job).unwrap();
        }

        assert!(next(&store).unwrap().is_none());
    }

    #[test]
    fn never_served_first() {
        let store = MemoryStore::new();
        let mut j1 = submit(&store, "j1");
        let j2 = submit(&store, "j2");
        let mut j3 = submit(&store, "j3");

        // Records that have been served before sort after every unserved one,
        // then by how long ago they were served.
        j1.last_served = Some(Utc::now());
        store.update(&j1).unwrap();
        j3.last_served = Some(Utc::now() - Duration::seconds(10));
        store.update(&j3).unwrap();

        let mut order = Vec::new();
        while let Some(mut job) = next(&store).unwrap() {
            order.push(job.id);
            job.start(Utc::now()).unwrap();
            store.update(&job).unwrap();
        }
        assert_eq!(order, [j2.id, j3.id, j1.id]);
    }
}
