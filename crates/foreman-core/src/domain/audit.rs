//! Audit entries: who did what to which entity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, AuditEntryId, ParticipantId};
use super::scope::Role;

/// Kind of actor that caused the event, derived from the caller's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityType {
    Admin,
    Participant,
    Agent,
}

impl From<Role> for AuthorityType {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => AuthorityType::Admin,
            Role::Participant => AuthorityType::Participant,
            Role::Agent => AuthorityType::Agent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TransitionRequested,
    JobCompleted,
    JobFailed,
    JobRetried,
    JobsPurged,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::TransitionRequested => "transition_requested",
            EventType::JobCompleted => "job_completed",
            EventType::JobFailed => "job_failed",
            EventType::JobRetried => "job_retried",
            EventType::JobsPurged => "jobs_purged",
        };
        f.write_str(s)
    }
}

/// Entity and scope references an audit entry is filed under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRefs {
    pub entity_id: Option<String>,
    pub provider_id: Option<ParticipantId>,
    pub agent_id: Option<AgentId>,
    pub consumer_id: Option<ParticipantId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub authority_type: AuthorityType,
    pub authority_id: String,
    pub event_type: EventType,

    /// Free-form event data. Diff-carrying entries keep the change list under `diff`.
    pub properties: Option<serde_json::Value>,

    #[serde(flatten)]
    pub refs: AuditRefs,

    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn diff(&self) -> Option<&serde_json::Value> {
        self.properties.as_ref().and_then(|p| p.get("diff"))
    }
}
