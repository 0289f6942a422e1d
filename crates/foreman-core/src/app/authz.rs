//! Authorization - 役割ごとの操作許可とスコープ判定
//!
//! 判定は 3 段階:
//! 1. Identity 自体が整合しているか（役割とスコープ）
//! 2. 役割がその操作を許されているか
//! 3. 対象エンティティのスコープに入っているか

use std::fmt;

use crate::domain::{AuthScope, ForemanError, Identity, Result, Role, validate_auth_scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOperation {
    /// Open a service transition and create its job.
    Request,
    Read,
    List,
    Claim,
    Complete,
    Fail,
    Retry,
    PollPending,
    ListTimedOut,
    Purge,
    Counts,
}

impl fmt::Display for JobOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOperation::Request => "request",
            JobOperation::Read => "read",
            JobOperation::List => "list",
            JobOperation::Claim => "claim",
            JobOperation::Complete => "complete",
            JobOperation::Fail => "fail",
            JobOperation::Retry => "retry",
            JobOperation::PollPending => "poll_pending",
            JobOperation::ListTimedOut => "list_timed_out",
            JobOperation::Purge => "purge",
            JobOperation::Counts => "counts",
        };
        f.write_str(s)
    }
}

/// 役割が操作を許されているか
///
/// - Admin: すべて
/// - Agent: 自分宛ての Job の取得・実行・結果報告
/// - Participant: 遷移の要求、閲覧、失敗した Job の再実行
pub fn role_allows(role: Role, op: JobOperation) -> bool {
    use JobOperation::*;
    match role {
        Role::Admin => true,
        Role::Agent => matches!(op, Read | List | Claim | Complete | Fail | PollPending),
        Role::Participant => matches!(op, Request | Read | List | Retry),
    }
}

pub fn authorize(identity: &Identity, op: JobOperation, target: &AuthScope) -> Result<()> {
    identity.validate()?;
    if !role_allows(identity.role, op) {
        return Err(ForemanError::Unauthorized(format!(
            "role {} may not {op} jobs",
            identity.role
        )));
    }
    validate_auth_scope(&identity.scope, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentId, ParticipantId};
    use rstest::rstest;
    use ulid::Ulid;

    #[rstest]
    #[case(Role::Admin, JobOperation::Purge, true)]
    #[case(Role::Admin, JobOperation::Claim, true)]
    #[case(Role::Agent, JobOperation::Claim, true)]
    #[case(Role::Agent, JobOperation::Complete, true)]
    #[case(Role::Agent, JobOperation::Retry, false)]
    #[case(Role::Agent, JobOperation::Request, false)]
    #[case(Role::Participant, JobOperation::Request, true)]
    #[case(Role::Agent, JobOperation::Purge, false)]
    #[case(Role::Participant, JobOperation::Retry, true)]
    #[case(Role::Participant, JobOperation::Complete, false)]
    #[case(Role::Participant, JobOperation::ListTimedOut, false)]
    fn role_table(#[case] role: Role, #[case] op: JobOperation, #[case] allowed: bool) {
        assert_eq!(role_allows(role, op), allowed);
    }

    #[test]
    fn role_check_precedes_scope_check() {
        let agent = AgentId::from_ulid(Ulid::new());
        let caller = Identity::agent("token", "edge-1", agent);
        let own = AuthScope {
            agent_id: Some(agent),
            ..AuthScope::default()
        };

        assert!(authorize(&caller, JobOperation::Claim, &own).is_ok());
        let err = authorize(&caller, JobOperation::Retry, &own).unwrap_err();
        assert!(err.to_string().contains("may not retry"));
    }

    #[test]
    fn malformed_identity_is_rejected() {
        let mut caller = Identity::participant("u1", "acme", ParticipantId::from_ulid(Ulid::new()));
        caller.scope.participant_id = None;
        assert!(matches!(
            authorize(&caller, JobOperation::Read, &AuthScope::default()),
            Err(ForemanError::Validation(_))
        ));
    }
}
