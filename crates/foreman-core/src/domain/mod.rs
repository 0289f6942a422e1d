//! Domain model (ids, entities, state machines, scopes, audit, diff).
//!
//! このモジュールは永続化やトランスポートを知りません。
//! 状態遷移はすべてエンティティのメソッド経由で行い、時刻は引数で受け取ります。

pub mod agent;
pub mod audit;
pub mod diff;
pub mod errors;
pub mod ids;
pub mod job;
pub mod page;
pub mod scope;
pub mod service;

pub use agent::Agent;
pub use audit::{AuditEntry, AuditRefs, AuthorityType, EventType};
pub use diff::{ChangeOp, FieldChange};
pub use errors::{ErrorKind, ForemanError, Result};
pub use ids::{AgentId, AuditEntryId, JobId, ParticipantId, ServiceGroupId, ServiceId};
pub use job::{Job, JobAction, JobState, JobTarget};
pub use page::{Page, PageRequest};
pub use scope::{AuthScope, Identity, IdentityScope, Role, validate_auth_scope};
pub use service::{Service, ServicePlacement, ServiceState};
