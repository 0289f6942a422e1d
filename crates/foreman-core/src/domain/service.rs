//! Service record and its pending-transition model.
//!
//! A service is "in transition" while `target_state` is set. Jobs drive the
//! transition; only a successful job completion clears it. A failed job leaves
//! the target in place so a retry can be issued against the same transition.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ForemanError, Result};
use super::ids::{AgentId, ParticipantId, ServiceGroupId, ServiceId};
use super::job::{JobAction, JobTarget};
use super::scope::AuthScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Registered but not yet provisioned.
    New,
    Stopped,
    Running,
    Deleted,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::New => "new",
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
            ServiceState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

impl ServiceState {
    /// State the service ends up in once `action` succeeds from `self`.
    /// `None` if the action does not apply to this state.
    pub fn target_for(self, action: JobAction) -> Option<ServiceState> {
        use ServiceState::*;
        match (action, self) {
            (JobAction::Create, New) => Some(Stopped),
            (JobAction::Start, Stopped) => Some(Running),
            (JobAction::Stop, Running) => Some(Stopped),
            (JobAction::HotUpdate, Running) => Some(Running),
            (JobAction::ColdUpdate, Stopped) => Some(Stopped),
            (JobAction::Delete, Stopped) => Some(Deleted),
            (JobAction::Create, _)
            | (JobAction::Start, _)
            | (JobAction::Stop, _)
            | (JobAction::HotUpdate, _)
            | (JobAction::ColdUpdate, _)
            | (JobAction::Delete, _) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,

    pub current_state: ServiceState,
    pub target_state: Option<ServiceState>,

    pub failed_action: Option<JobAction>,
    pub error_message: Option<String>,
    pub retry_count: u32,

    /// Opaque data reported back by the agent.
    pub resources: Option<serde_json::Value>,
    pub external_id: Option<String>,

    pub current_properties: Option<serde_json::Value>,
    pub target_properties: Option<serde_json::Value>,

    pub provider_id: ParticipantId,
    pub consumer_id: ParticipantId,
    pub agent_id: AgentId,
    pub group_id: ServiceGroupId,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a service lives: who provides it, who consumes it, who runs it.
#[derive(Debug, Clone, Copy)]
pub struct ServicePlacement {
    pub provider_id: ParticipantId,
    pub consumer_id: ParticipantId,
    pub agent_id: AgentId,
    pub group_id: ServiceGroupId,
}

impl Service {
    pub fn new(
        id: ServiceId,
        name: impl Into<String>,
        placement: ServicePlacement,
        properties: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            current_state: ServiceState::New,
            target_state: None,
            failed_action: None,
            error_message: None,
            retry_count: 0,
            resources: None,
            external_id: None,
            current_properties: properties,
            target_properties: None,
            provider_id: placement.provider_id,
            consumer_id: placement.consumer_id,
            agent_id: placement.agent_id,
            group_id: placement.group_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn in_transition(&self) -> bool {
        self.target_state.is_some()
    }

    /// Open a transition for `action`. The caller then creates the job.
    pub fn request_transition(
        &mut self,
        action: JobAction,
        target_properties: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<ServiceState> {
        if let Some(target) = self.target_state {
            return Err(ForemanError::InvalidInput(format!(
                "service {} is already transitioning to {target}",
                self.id
            )));
        }
        let target = self.current_state.target_for(action).ok_or_else(|| {
            ForemanError::InvalidInput(format!(
                "cannot {action} service {} in state {}",
                self.id, self.current_state
            ))
        })?;
        self.target_state = Some(target);
        if target_properties.is_some() {
            self.target_properties = target_properties;
        }
        self.updated_at = now;
        Ok(target)
    }

    pub fn handle_job_complete(
        &mut self,
        resources: Option<serde_json::Value>,
        external_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(target) = self.target_state.take() else {
            return Err(ForemanError::InvalidInput(format!(
                "service {} not in transition",
                self.id
            )));
        };
        self.current_state = target;
        self.failed_action = None;
        self.error_message = None;
        self.retry_count = 0;
        if resources.is_some() {
            self.resources = resources;
        }
        if external_id.is_some() {
            self.external_id = external_id;
        }
        if let Some(properties) = self.target_properties.take() {
            self.current_properties = Some(properties);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Record the failure. The transition stays pending.
    pub fn handle_job_failure(
        &mut self,
        message: impl Into<String>,
        action: JobAction,
        now: DateTime<Utc>,
    ) {
        self.error_message = Some(message.into());
        self.failed_action = Some(action);
        self.updated_at = now;
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ForemanError::Validation(
                "service name cannot be empty".into(),
            ));
        }
        if self.provider_id.is_nil() || self.consumer_id.is_nil() {
            return Err(ForemanError::Validation(format!(
                "service {} must reference a provider and a consumer",
                self.id
            )));
        }
        if self.agent_id.is_nil() {
            return Err(ForemanError::Validation(format!(
                "service {} must reference an agent",
                self.id
            )));
        }
        if self.group_id.is_nil() {
            return Err(ForemanError::Validation(format!(
                "service {} must reference a group",
                self.id
            )));
        }
        if self.failed_action.is_some() && self.error_message.is_none() {
            return Err(ForemanError::Validation(format!(
                "service {} has a failed action without an error message",
                self.id
            )));
        }
        Ok(())
    }

    pub fn job_target(&self) -> JobTarget {
        JobTarget {
            agent_id: self.agent_id,
            service_id: self.id,
            provider_id: self.provider_id,
            consumer_id: self.consumer_id,
        }
    }

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
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn make_service(state: ServiceState) -> Service {
        let mut service = Service::new(
            ServiceId::from_ulid(Ulid::new()),
            "db-primary",
            ServicePlacement {
                provider_id: ParticipantId::from_ulid(Ulid::new()),
                consumer_id: ParticipantId::from_ulid(Ulid::new()),
                agent_id: AgentId::from_ulid(Ulid::new()),
                group_id: ServiceGroupId::from_ulid(Ulid::new()),
            },
            Some(json!({"size": "small"})),
            t0(),
        );
        service.current_state = state;
        service
    }

    #[test]
    fn complete_moves_to_target_and_clears_failure() {
        let mut service = make_service(ServiceState::Stopped);
        service.request_transition(JobAction::Start, None, t0()).unwrap();
        service.handle_job_failure("disk full", JobAction::Start, t0());
        service.retry_count = 2;

        service
            .handle_job_complete(Some(json!({"cpu": 2})), Some("vm-123".into()), t0())
            .unwrap();

        assert_eq!(service.current_state, ServiceState::Running);
        assert!(service.target_state.is_none());
        assert!(service.failed_action.is_none());
        assert!(service.error_message.is_none());
        assert_eq!(service.retry_count, 0);
        assert_eq!(service.resources, Some(json!({"cpu": 2})));
        assert_eq!(service.external_id.as_deref(), Some("vm-123"));
    }

    #[test]
    fn complete_keeps_resources_when_none_reported() {
        let mut service = make_service(ServiceState::Running);
        service.resources = Some(json!({"cpu": 1}));
        service.external_id = Some("vm-1".into());
        service.request_transition(JobAction::Stop, None, t0()).unwrap();

        service.handle_job_complete(None, None, t0()).unwrap();

        assert_eq!(service.resources, Some(json!({"cpu": 1})));
        assert_eq!(service.external_id.as_deref(), Some("vm-1"));
    }

    #[test]
    fn complete_promotes_target_properties() {
        let mut service = make_service(ServiceState::Running);
        service
            .request_transition(JobAction::HotUpdate, Some(json!({"size": "large"})), t0())
            .unwrap();

        service.handle_job_complete(None, None, t0()).unwrap();

        assert_eq!(service.current_properties, Some(json!({"size": "large"})));
        assert!(service.target_properties.is_none());
    }

    #[test]
    fn complete_without_transition_is_rejected() {
        let mut service = make_service(ServiceState::Running);
        let err = service.handle_job_complete(None, None, t0()).unwrap_err();
        assert!(matches!(err, ForemanError::InvalidInput(_)));
        assert_eq!(service.current_state, ServiceState::Running);
    }

    #[test]
    fn failure_keeps_target_state() {
        let mut service = make_service(ServiceState::Stopped);
        service.request_transition(JobAction::Start, None, t0()).unwrap();

        service.handle_job_failure("disk full", JobAction::Start, t0());

        assert_eq!(service.target_state, Some(ServiceState::Running));
        assert_eq!(service.error_message.as_deref(), Some("disk full"));
        assert_eq!(service.failed_action, Some(JobAction::Start));
        assert!(service.validate().is_ok());
    }

    #[rstest]
    #[case(ServiceState::New, JobAction::Create, Some(ServiceState::Stopped))]
    #[case(ServiceState::Stopped, JobAction::Start, Some(ServiceState::Running))]
    #[case(ServiceState::Running, JobAction::Stop, Some(ServiceState::Stopped))]
    #[case(ServiceState::Running, JobAction::HotUpdate, Some(ServiceState::Running))]
    #[case(ServiceState::Stopped, JobAction::ColdUpdate, Some(ServiceState::Stopped))]
    #[case(ServiceState::Stopped, JobAction::Delete, Some(ServiceState::Deleted))]
    #[case(ServiceState::Running, JobAction::Delete, None)]
    #[case(ServiceState::Deleted, JobAction::Start, None)]
    #[case(ServiceState::New, JobAction::Start, None)]
    fn action_targets(
        #[case] from: ServiceState,
        #[case] action: JobAction,
        #[case] expected: Option<ServiceState>,
    ) {
        assert_eq!(from.target_for(action), expected);
    }

    #[test]
    fn request_transition_rejects_overlap() {
        let mut service = make_service(ServiceState::Stopped);
        service.request_transition(JobAction::Start, None, t0()).unwrap();
        let err = service
            .request_transition(JobAction::Delete, None, t0())
            .unwrap_err();
        assert!(matches!(err, ForemanError::InvalidInput(_)));
        assert_eq!(service.target_state, Some(ServiceState::Running));
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut service = make_service(ServiceState::New);
        service.name = "  ".into();
        assert!(matches!(service.validate(), Err(ForemanError::Validation(_))));
    }
}
