//! Read-only aggregate view of the queue.
use serde::Serialize;

use crate::error::StoreError;
use crate::store::JobStore;
use crate::types::job::JobView;
use crate::types::states::JobState;

const RECENT_FAILED: usize = 10;
const RECENT_JOBS: usize = 20;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Dashboard {
    pub total_jobs: usize,
    pub queued_count: usize,
    pub running_count: usize,
    pub done_count: usize,
    pub failed_count: usize,
    /// Most recently updated failures first.
    pub recent_failed: Vec<JobView>,
    /// Most recently created jobs first.
    pub recent_jobs: Vec<JobView>,
}

pub fn collect<S: JobStore + ?Sized>(store: &S) -> Result<Dashboard, StoreError> {
    let jobs = store.list_all()?;
    let mut dash = Dashboard {
        total_jobs: jobs.len(),
        ..Default::default()
    };

    for job in &jobs {
        let count = match job.state {
            JobState::Queued => &mut dash.queued_count,
            JobState::Running => &mut dash.running_count,
            JobState::Done => &mut dash.done_count,
            JobState::Failed => &mut dash.failed_count,
        };
        *count += 1;
    }

    let mut failed: Vec<_> =
        jobs.iter().filter(|j| j.state == JobState::Failed).collect();
    failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
    dash.recent_failed = failed
        .into_iter()
        .take(RECENT_FAILED)
        .map(|j| j.view(false))
        .collect();

    // Ids are assigned in creation order.
    dash.recent_jobs = jobs
        .iter()
        .rev()
        .take(RECENT_JOBS)
        .map(|j| j.view(false))
        .collect();

    Ok(dash)
}
