//! Counts exposed for dashboards and the CLI summary.

use serde::{Deserialize, Serialize};

use crate::domain::JobState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn record(&mut self, state: JobState) {
        match state {
            JobState::Pending => self.pending += 1,
            JobState::Processing => self.processing += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

impl FromIterator<JobState> for JobCounts {
    fn from_iter<I: IntoIterator<Item = JobState>>(states: I) -> Self {
        let mut counts = JobCounts::default();
        for state in states {
            counts.record(state);
        }
        counts
    }
}
