//! Auditor - 監査ログの作成
//!
//! 呼び出し元のトランザクション内のリポジトリに書き込むので、
//! 監査ログは状態変更と一緒に commit / rollback されます。

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::domain::{
    AuditEntry, AuditRefs, AuthorityType, EventType, Identity, Result, diff,
};
use crate::ports::{AuditEntryRepository, Clock, IdGenerator};

#[derive(Clone)]
pub struct Auditor {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Auditor {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { clock, ids }
    }

    pub async fn create(
        &self,
        repo: &dyn AuditEntryRepository,
        identity: &Identity,
        event_type: EventType,
        properties: Option<serde_json::Value>,
        refs: AuditRefs,
    ) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: self.ids.generate_audit_entry_id(),
            authority_type: AuthorityType::from(identity.role),
            authority_id: identity.id.clone(),
            event_type,
            properties,
            refs,
            created_at: self.clock.now(),
        };
        repo.create(&entry).await?;
        Ok(entry)
    }

    /// before / after の差分を `properties.diff` に入れて記録する
    pub async fn create_with_diff<B, A>(
        &self,
        repo: &dyn AuditEntryRepository,
        identity: &Identity,
        event_type: EventType,
        refs: AuditRefs,
        before: &B,
        after: &A,
    ) -> Result<AuditEntry>
    where
        B: Serialize + Sync + ?Sized,
        A: Serialize + Sync + ?Sized,
    {
        let changes = diff::compute(before, after)?;
        let properties = json!({ "diff": changes });
        self.create(repo, identity, event_type, Some(properties), refs)
            .await
    }
}
