use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::states::{JobState, ViewState};
use crate::error::TransitionError;

pub type JobId = u64;

/// A unit of work and its execution record.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Job {
    pub id: JobId,
    pub owner: String,
    pub payload: String,
    pub fingerprint: String,
    pub state: JobState,
    pub result: Option<String>,
    pub error: Option<String>,
    /// Time of the most recent transition into `done` or `failed`.
    pub last_served: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a store needs to create a job record. The store assigns the id.
#[derive(Clone, Debug)]
pub struct NewJob {
    pub owner: String,
    pub payload: String,
    pub fingerprint: String,
    /// When set, the job is recorded directly as `failed` with this error.
    /// Used for submissions turned away by the rate limiter, so they never
    /// become visible as `queued`.
    pub rejection: Option<String>,
}

impl Job {
    pub fn from_new(id: JobId, new: NewJob, now: DateTime<Utc>) -> Self {
        let (state, last_served) = match new.rejection {
            Some(_) => (JobState::Failed, Some(now)),
            None => (JobState::Queued, None),
        };

        Self {
            id,
            owner: new.owner,
            payload: new.payload,
            fingerprint: new.fingerprint,
            state,
            result: None,
            error: new.rejection,
            last_served,
            created_at: now,
            updated_at: now,
        }
    }

    fn expect_state(&self, from: JobState, to: JobState) -> Result<(), TransitionError> {
        if self.state == from {
            Ok(())
        } else {
            Err(TransitionError {
                id: self.id,
                from: self.state,
                to,
            })
        }
    }

    /// `queued -> running`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.expect_state(JobState::Queued, JobState::Running)?;
        self.state = JobState::Running;
        self.updated_at = now;
        Ok(())
    }

    /// `running -> done`, recording the result.
    pub fn complete(
        &mut self,
        result: String,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.expect_state(JobState::Running, JobState::Done)?;
        self.state = JobState::Done;
        self.result = Some(result);
        self.error = None;
        self.last_served = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `running -> failed`, recording the error.
    pub fn fail(
        &mut self,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.expect_state(JobState::Running, JobState::Failed)?;
        self.state = JobState::Failed;
        self.result = None;
        self.error = Some(error);
        self.last_served = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `running -> queued`. Only restart recovery does this.
    pub fn reclaim(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.expect_state(JobState::Running, JobState::Queued)?;
        self.state = JobState::Queued;
        self.updated_at = now;
        Ok(())
    }

    pub fn view(&self, is_duplicate: bool) -> JobView {
        JobView {
            id: self.id,
            state: self.state.into(),
            result: self.result.clone(),
            error: self.error.clone(),
            fingerprint: Some(self.fingerprint.clone()),
            is_duplicate,
        }
    }
}

/// What callers get back from a submission or a status query.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub state: ViewState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub is_duplicate: bool,
}

impl JobView {
    /// The sentinel returned for status queries of unknown ids.
    pub fn not_found(id: JobId) -> Self {
        Self {
            id,
            state: ViewState::NotFound,
            result: None,
            error: Some("job not found".into()),
            fingerprint: None,
            is_duplicate: false,
        }
    }
}
