use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a stored job.
///
/// Jobs move along `queued -> running -> {done, failed}`. The only way back
/// to `queued` is restart recovery reclaiming an orphaned `running` job.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State as reported to callers: a job state, or `not_found` when a status
/// query names an id the store doesn't know.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    Queued,
    Running,
    Done,
    Failed,
    NotFound,
}

impl From<JobState> for ViewState {
    fn from(value: JobState) -> Self {
        match value {
            JobState::Queued => Self::Queued,
            JobState::Running => Self::Running,
            JobState::Done => Self::Done,
            JobState::Failed => Self::Failed,
        }
    }
}
