//! Agent record (minimal: identity, owner, visibility).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ForemanError, Result};
use super::ids::{AgentId, ParticipantId};
use super::scope::AuthScope;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    /// The participant on whose behalf this agent executes jobs.
    pub provider_id: ParticipantId,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        provider_id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            provider_id,
            created_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ForemanError::Validation("agent name cannot be empty".into()));
        }
        if self.provider_id.is_nil() {
            return Err(ForemanError::Validation(format!(
                "agent {} must reference a provider",
                self.id
            )));
        }
        Ok(())
    }

    pub fn auth_scope(&self) -> AuthScope {
        AuthScope {
            participant_id: None,
            provider_id: Some(self.provider_id),
            consumer_id: None,
            agent_id: Some(self.id),
        }
    }
}
