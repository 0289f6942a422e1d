//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + 乱数から ULID を生成

use crate::domain::ids::{AgentId, AuditEntryId, Id, IdMarker, JobId, ServiceId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はエンティティ ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから共有される）
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    fn generate_service_id(&self) -> ServiceId;

    fn generate_agent_id(&self) -> AgentId;

    fn generate_audit_entry_id(&self) -> AuditEntryId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// FixedClock を渡すと timestamp 部分が固定され、テストで並び順を制御できます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next<T: IdMarker>(&self) -> Id<T> {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Id::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        self.next()
    }

    fn generate_service_id(&self) -> ServiceId {
        self.next()
    }

    fn generate_agent_id(&self) -> AgentId {
        self.next()
    }

    fn generate_audit_entry_id(&self) -> AuditEntryId {
        self.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_job_id();
        let id2 = id_gen.generate_job_id();

        assert_ne!(id1, id2);
        assert!(!id1.is_nil());
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_service_id();
        let id2 = id_gen.generate_service_id();

        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }

    #[test]
    fn different_id_types_are_generated() {
        let id_gen = UlidGenerator::new(SystemClock);

        assert!(id_gen.generate_job_id().to_string().starts_with("job-"));
        assert!(id_gen.generate_agent_id().to_string().starts_with("agent-"));
        assert!(id_gen.generate_audit_entry_id().to_string().starts_with("audit-"));
    }
}
