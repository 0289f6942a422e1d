//! Job record and state machine.
//!
//! A Job is one unit of work an agent performs to move a Service toward its
//! target state. Transitions go through methods, never through direct field
//! writes, so the timestamp invariants hold:
//! - `claimed_at` is set iff the state is Processing, Completed or Failed
//! - `completed_at` is set iff the state is Completed

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ForemanError, Result};
use super::ids::{AgentId, JobId, ParticipantId, ServiceId};
use super::scope::AuthScope;

/// What the agent is asked to do to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Create,
    Start,
    Stop,
    HotUpdate,
    ColdUpdate,
    Delete,
}

impl JobAction {
    pub const ALL: [JobAction; 6] = [
        JobAction::Create,
        JobAction::Start,
        JobAction::Stop,
        JobAction::HotUpdate,
        JobAction::ColdUpdate,
        JobAction::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobAction::Create => "create",
            JobAction::Start => "start",
            JobAction::Stop => "stop",
            JobAction::HotUpdate => "hot_update",
            JobAction::ColdUpdate => "cold_update",
            JobAction::Delete => "delete",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobAction {
    type Err = ForemanError;

    fn from_str(s: &str) -> Result<Self> {
        JobAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ForemanError::Validation(format!("invalid job action: '{s}'")))
    }
}

/// Job state.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Failed
/// - Failed -> Pending (explicit retry only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for an agent to claim it.
    Pending,

    /// Claimed by an agent, work in progress.
    Processing,

    Completed,

    Failed,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Is this a terminal state (only an explicit retry leaves it)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Pending or Processing.
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Pending | JobState::Processing)
    }

    /// Whether `claimed_at` must be set in this state.
    pub fn has_been_claimed(self) -> bool {
        !matches!(self, JobState::Pending)
    }

    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        match (self, to) {
            (Pending, Processing) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            (Failed, Pending) => true,
            (Pending, _) | (Processing, _) | (Completed, _) | (Failed, _) => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = ForemanError;

    fn from_str(s: &str) -> Result<Self> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ForemanError::Validation(format!("invalid job state: '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub action: JobAction,
    pub priority: u32,
    pub state: JobState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub agent_id: AgentId,
    pub service_id: ServiceId,
    pub provider_id: ParticipantId,
    pub consumer_id: ParticipantId,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// References a new job is addressed with, copied from its service.
#[derive(Debug, Clone, Copy)]
pub struct JobTarget {
    pub agent_id: AgentId,
    pub service_id: ServiceId,
    pub provider_id: ParticipantId,
    pub consumer_id: ParticipantId,
}

impl Job {
    pub fn new(
        id: JobId,
        action: JobAction,
        priority: u32,
        target: JobTarget,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            action,
            priority,
            state: JobState::Pending,
            error_message: None,
            claimed_at: None,
            completed_at: None,
            agent_id: target.agent_id,
            service_id: target.service_id,
            provider_id: target.provider_id,
            consumer_id: target.consumer_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Assign the job to the agent that will execute it.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobState::Pending, JobState::Processing, "claimed")?;
        self.claimed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobState::Processing, JobState::Completed, "completed")?;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobState::Processing, JobState::Failed, "failed")?;
        self.error_message = Some(message.into());
        self.updated_at = now;
        Ok(())
    }

    /// Put a failed job back in the queue. Does not touch the service.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobState::Failed, JobState::Pending, "retried")?;
        self.error_message = None;
        self.claimed_at = None;
        self.updated_at = now;
        Ok(())
    }

    fn transition(&mut self, required: JobState, to: JobState, verb: &str) -> Result<()> {
        if self.state != required || !self.state.can_transition_to(to) {
            return Err(ForemanError::InvalidInput(format!(
                "job {} cannot be {verb}: state is {}, expected {}",
                self.id, self.state, required
            )));
        }
        self.state = to;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.priority < 1 {
            return Err(ForemanError::Validation(format!(
                "job priority must be at least 1, got {}",
                self.priority
            )));
        }
        if self.agent_id.is_nil() {
            return Err(ForemanError::Validation("job agent id cannot be empty".into()));
        }
        if self.service_id.is_nil() {
            return Err(ForemanError::Validation(
                "job service id cannot be empty".into(),
            ));
        }
        if self.state.has_been_claimed() != self.claimed_at.is_some() {
            return Err(ForemanError::Validation(format!(
                "job in state {} has inconsistent claimed_at",
                self.state
            )));
        }
        if (self.state == JobState::Completed) != self.completed_at.is_some() {
            return Err(ForemanError::Validation(format!(
                "job in state {} has inconsistent completed_at",
                self.state
            )));
        }
        Ok(())
    }

    /// Jobs are visible to their provider, consumer and executing agent.
    pub fn auth_scope(&self) -> AuthScope {
        AuthScope {
            participant_id: None,
            provider_id: Some(self.provider_id),
            consumer_id: Some(self.consumer_id),
            agent_id: Some(self.agent_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn make_job() -> Job {
        Job::new(
            JobId::from_ulid(Ulid::new()),
            JobAction::Start,
            1,
            JobTarget {
                agent_id: AgentId::from_ulid(Ulid::new()),
                service_id: ServiceId::from_ulid(Ulid::new()),
                provider_id: ParticipantId::from_ulid(Ulid::new()),
                consumer_id: ParticipantId::from_ulid(Ulid::new()),
            },
            t0(),
        )
    }

    #[test]
    fn new_job_starts_pending() {
        let job = make_job();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.claimed_at.is_none());
        assert!(job.validate().is_ok());
    }

    #[test]
    fn claim_then_complete() {
        let mut job = make_job();
        let claimed = t0() + Duration::seconds(5);
        job.claim(claimed).unwrap();
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.claimed_at, Some(claimed));

        let done = claimed + Duration::seconds(30);
        job.complete(done).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.completed_at, Some(done));
        assert!(job.validate().is_ok());
    }

    #[test]
    fn fail_records_message_without_completed_at() {
        let mut job = make_job();
        job.claim(t0()).unwrap();
        job.fail("disk full", t0()).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error_message.as_deref(), Some("disk full"));
        assert!(job.completed_at.is_none());
        assert!(job.validate().is_ok());
    }

    #[test]
    fn claim_requires_pending() {
        let mut job = make_job();
        job.claim(t0()).unwrap();
        let err = job.claim(t0()).unwrap_err();
        assert!(matches!(err, ForemanError::InvalidInput(_)));
        assert_eq!(job.state, JobState::Processing);
    }

    #[test]
    fn terminal_jobs_reject_complete_and_fail() {
        let mut job = make_job();
        job.claim(t0()).unwrap();
        job.complete(t0()).unwrap();
        let snapshot = job.clone();

        assert!(matches!(job.complete(t0()), Err(ForemanError::InvalidInput(_))));
        assert!(matches!(job.fail("late", t0()), Err(ForemanError::InvalidInput(_))));
        assert_eq!(job, snapshot);
    }

    #[test]
    fn retry_clears_error_and_claim() {
        let mut job = make_job();
        job.claim(t0()).unwrap();
        job.fail("boom", t0()).unwrap();
        job.retry(t0()).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.error_message.is_none());
        assert!(job.claimed_at.is_none());
        assert!(job.validate().is_ok());
    }

    #[test]
    fn retry_requires_failed() {
        let mut job = make_job();
        assert!(matches!(job.retry(t0()), Err(ForemanError::InvalidInput(_))));
    }

    #[rstest]
    #[case(JobState::Pending, JobState::Processing, true)]
    #[case(JobState::Processing, JobState::Completed, true)]
    #[case(JobState::Processing, JobState::Failed, true)]
    #[case(JobState::Failed, JobState::Pending, true)]
    #[case(JobState::Pending, JobState::Completed, false)]
    #[case(JobState::Completed, JobState::Pending, false)]
    #[case(JobState::Completed, JobState::Failed, false)]
    #[case(JobState::Processing, JobState::Pending, false)]
    fn transition_table(#[case] from: JobState, #[case] to: JobState, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn validate_rejects_zero_priority_and_nil_refs() {
        let mut job = make_job();
        job.priority = 0;
        assert!(matches!(job.validate(), Err(ForemanError::Validation(_))));

        let mut job = make_job();
        job.agent_id = AgentId::nil();
        assert!(matches!(job.validate(), Err(ForemanError::Validation(_))));

        let mut job = make_job();
        job.service_id = ServiceId::nil();
        assert!(matches!(job.validate(), Err(ForemanError::Validation(_))));
    }

    #[test]
    fn enum_text_parsing() {
        assert_eq!("hot_update".parse::<JobAction>().unwrap(), JobAction::HotUpdate);
        assert_eq!("processing".parse::<JobState>().unwrap(), JobState::Processing);
        assert!(matches!(
            "reboot".parse::<JobAction>(),
            Err(ForemanError::Validation(_))
        ));
        assert!(matches!(
            "paused".parse::<JobState>(),
            Err(ForemanError::Validation(_))
        ));
    }

    #[test]
    fn auth_scope_carries_job_references() {
        let job = make_job();
        let scope = job.auth_scope();
        assert_eq!(scope.provider_id, Some(job.provider_id));
        assert_eq!(scope.consumer_id, Some(job.consumer_id));
        assert_eq!(scope.agent_id, Some(job.agent_id));
        assert!(scope.participant_id.is_none());
    }
}
