//! Authorization scopes and the caller identity.
//!
//! Matching is a pure predicate over two small structs. Resolving the target
//! scope (walking job -> service -> provider/consumer/agent) is the caller's
//! job; see `JobRepository::auth_scope`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{ForemanError, Result};
use super::ids::{AgentId, ParticipantId};

/// Scope of the entity being accessed. All fields empty means globally visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthScope {
    pub participant_id: Option<ParticipantId>,
    pub provider_id: Option<ParticipantId>,
    pub consumer_id: Option<ParticipantId>,
    pub agent_id: Option<AgentId>,
}

impl AuthScope {
    pub fn is_global(&self) -> bool {
        self.participant_id.is_none()
            && self.provider_id.is_none()
            && self.consumer_id.is_none()
            && self.agent_id.is_none()
    }

    /// Participant matches as direct tenant, provider side or consumer side.
    fn admits_participant(&self, participant: ParticipantId) -> bool {
        [self.participant_id, self.provider_id, self.consumer_id]
            .into_iter()
            .flatten()
            .any(|id| id == participant)
    }
}

/// Scope of the caller. Both fields empty means unrestricted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityScope {
    pub participant_id: Option<ParticipantId>,
    pub agent_id: Option<AgentId>,
}

impl IdentityScope {
    pub fn is_unrestricted(&self) -> bool {
        self.participant_id.is_none() && self.agent_id.is_none()
    }
}

/// Check `identity` against the resolved scope of a target entity.
pub fn validate_auth_scope(identity: &IdentityScope, target: &AuthScope) -> Result<()> {
    if identity.is_unrestricted() || target.is_global() {
        return Ok(());
    }
    if let Some(participant) = identity.participant_id
        && target.admits_participant(participant)
    {
        return Ok(());
    }
    // Agents only ever match on the agent field.
    if let Some(agent) = identity.agent_id
        && target.agent_id == Some(agent)
    {
        return Ok(());
    }
    Err(ForemanError::Unauthorized(
        "target is outside the caller's scope".into(),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Participant,
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Participant => "participant",
            Role::Agent => "agent",
        };
        f.write_str(s)
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub scope: IdentityScope,
}

impl Identity {
    pub fn admin(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: Role::Admin,
            scope: IdentityScope::default(),
        }
    }

    pub fn participant(
        id: impl Into<String>,
        name: impl Into<String>,
        participant: ParticipantId,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: Role::Participant,
            scope: IdentityScope {
                participant_id: Some(participant),
                agent_id: None,
            },
        }
    }

    pub fn agent(id: impl Into<String>, name: impl Into<String>, agent: AgentId) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: Role::Agent,
            scope: IdentityScope {
                participant_id: None,
                agent_id: Some(agent),
            },
        }
    }

    /// Role and scope must agree, otherwise an empty scope would turn a
    /// participant into an administrator.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ForemanError::Validation("identity id cannot be empty".into()));
        }
        match self.role {
            Role::Admin if !self.scope.is_unrestricted() => Err(ForemanError::Validation(
                "admin identity cannot carry a scope".into(),
            )),
            Role::Participant if self.scope.participant_id.is_none() => {
                Err(ForemanError::Validation(
                    "participant identity requires a participant id".into(),
                ))
            }
            Role::Agent if self.scope.agent_id.is_none() => Err(ForemanError::Validation(
                "agent identity requires an agent id".into(),
            )),
            Role::Admin | Role::Participant | Role::Agent => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ulid::Ulid;

    fn participant(n: u128) -> ParticipantId {
        ParticipantId::from_ulid(Ulid(n))
    }

    fn agent(n: u128) -> AgentId {
        AgentId::from_ulid(Ulid(n))
    }

    const P: u128 = 1;
    const Q: u128 = 2;
    const A: u128 = 10;
    const B: u128 = 11;

    fn identity(p: Option<u128>, a: Option<u128>) -> IdentityScope {
        IdentityScope {
            participant_id: p.map(participant),
            agent_id: a.map(agent),
        }
    }

    fn target(
        participant_id: Option<u128>,
        provider_id: Option<u128>,
        consumer_id: Option<u128>,
        agent_id: Option<u128>,
    ) -> AuthScope {
        AuthScope {
            participant_id: participant_id.map(participant),
            provider_id: provider_id.map(participant),
            consumer_id: consumer_id.map(participant),
            agent_id: agent_id.map(agent),
        }
    }

    #[rstest]
    #[case::admin_any_target(identity(None, None), target(Some(Q), Some(Q), Some(Q), Some(B)), true)]
    #[case::global_target(identity(Some(P), None), target(None, None, None, None), true)]
    #[case::direct_tenant(identity(Some(P), None), target(Some(P), None, None, None), true)]
    #[case::provider_side(identity(Some(P), None), target(None, Some(P), Some(Q), None), true)]
    #[case::consumer_side(identity(Some(P), None), target(None, Some(Q), Some(P), None), true)]
    #[case::other_tenant(identity(Some(P), None), target(Some(Q), None, None, None), false)]
    #[case::other_provider(identity(Some(P), None), target(None, Some(Q), Some(Q), Some(A)), false)]
    #[case::own_agent(identity(None, Some(A)), target(None, Some(Q), None, Some(A)), true)]
    #[case::foreign_agent(identity(None, Some(A)), target(None, None, None, Some(B)), false)]
    #[case::agent_never_matches_participant(identity(None, Some(A)), target(Some(Q), None, None, None), false)]
    fn scope_matching(
        #[case] caller: IdentityScope,
        #[case] resolved: AuthScope,
        #[case] authorized: bool,
    ) {
        let result = validate_auth_scope(&caller, &resolved);
        assert_eq!(result.is_ok(), authorized, "{result:?}");
        if !authorized {
            assert!(matches!(result, Err(ForemanError::Unauthorized(_))));
        }
    }

    #[test]
    fn agent_identity_only_sees_its_own_jobs() {
        let caller = Identity::agent("agent-token", "edge-1", agent(A));
        assert!(caller.validate().is_ok());

        let own = target(None, Some(P), Some(Q), Some(A));
        let sibling = target(None, Some(P), Some(Q), Some(B));
        assert!(validate_auth_scope(&caller.scope, &own).is_ok());
        assert!(validate_auth_scope(&caller.scope, &sibling).is_err());
    }

    #[test]
    fn identity_role_and_scope_must_agree() {
        assert!(Identity::admin("root", "root").validate().is_ok());

        let mut hollow_participant = Identity::participant("u1", "acme", participant(P));
        hollow_participant.scope.participant_id = None;
        assert!(matches!(
            hollow_participant.validate(),
            Err(ForemanError::Validation(_))
        ));

        let mut scoped_admin = Identity::admin("root", "root");
        scoped_admin.scope.agent_id = Some(agent(A));
        assert!(matches!(scoped_admin.validate(), Err(ForemanError::Validation(_))));
    }
}
