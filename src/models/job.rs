use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::store::Record;

/// Lifecycle state of an analysis job.
///
/// `Waiting` is the only initial state; `Finished` and `Error` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Waiting,
    Running,
    Finished,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

/// One analysis request linking an image to its eventual result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: i64,
    pub image_id: i64,
    pub state: JobState,
    /// Id of the `ResultRecord`; set only when `state == Finished`.
    pub result: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Copy of this job moved to `running`.
    pub fn started(&self) -> Self {
        Self {
            state: JobState::Running,
            ..self.clone()
        }
    }

    /// Copy of this job moved to `finished` with its result reference.
    pub fn finished(&self, result_id: i64) -> Self {
        Self {
            state: JobState::Finished,
            result: Some(result_id),
            ..self.clone()
        }
    }

    /// Copy of this job moved to `error`. Clears any result reference.
    pub fn failed(&self) -> Self {
        Self {
            state: JobState::Error,
            result: None,
            ..self.clone()
        }
    }
}

/// Payload used to create a job row.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub image_id: i64,
}

impl Record for Job {
    type Draft = NewJob;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_draft(id: i64, now: DateTime<Utc>, draft: NewJob) -> Self {
        Self {
            id,
            image_id: draft.image_id,
            state: JobState::Waiting,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Full ordered job list as last known to the coordinator.
///
/// Observers replace whatever they held with each snapshot; there is no diffing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueSnapshot {
    pub jobs: Vec<Job>,
}

impl QueueSnapshot {
    pub fn get(&self, job_id: i64) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == job_id)
    }

    pub fn running(&self) -> Option<&Job> {
        self.jobs.iter().find(|job| job.state == JobState::Running)
    }

    /// Jobs not yet in a terminal state.
    pub fn pending_count(&self) -> usize {
        self.jobs.iter().filter(|job| !job.state.is_terminal()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_state_text_form() {
        assert_eq!(JobState::Waiting.to_string(), "waiting");
        assert_eq!(JobState::from_str("finished").unwrap(), JobState::Finished);
        assert_eq!(
            serde_json::to_value(JobState::Error).unwrap(),
            serde_json::json!("error")
        );
        assert!(JobState::from_str("paused").is_err());
    }

    #[test]
    fn test_failed_clears_result() {
        let now = Utc::now();
        let job = Job::from_draft(7, now, NewJob { image_id: 3 }).finished(11);
        assert_eq!(job.result, Some(11));

        let failed = job.failed();
        assert_eq!(failed.state, JobState::Error);
        assert_eq!(failed.result, None);
        assert_eq!(failed.image_id, 3);
    }
}
