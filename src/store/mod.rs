//! Durable job records.
//!
//! The queue only needs create, read, full-record update and filter-by-state
//! from its store, with read-your-writes consistency. The store is also the
//! arbiter of fingerprint uniqueness: `create_job` must fail with
//! [`StoreError::Conflict`] rather than create a second job for a fingerprint.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::types::job::{Job, JobId, NewJob};
use crate::types::states::JobState;

pub trait JobStore: Send + Sync {
    /// Creates a job with the next id. Fails with `Conflict` if a job with
    /// the same fingerprint exists.
    fn create_job(&self, new: NewJob) -> Result<Job, StoreError>;

    fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<Job>, StoreError>;

    /// All jobs in `state`, in ascending id order.
    fn list_by_state(&self, state: JobState) -> Result<Vec<Job>, StoreError>;

    /// Every job, in ascending id order.
    fn list_all(&self) -> Result<Vec<Job>, StoreError>;

    /// Replaces the stored record with `job`.
    fn update(&self, job: &Job) -> Result<(), StoreError>;
}
