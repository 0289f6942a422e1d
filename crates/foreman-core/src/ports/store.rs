//! Store port - ジョブ・サービス・監査ログの正本（source of truth）
//!
//! Store は以下を管理します：
//! - Job / Service / Agent の状態
//! - 監査ログ（AuditEntry）
//!
//! # 設計原則
//! - 状態遷移（claim/complete/fail/retry）と監査ログの作成は同一トランザクション内
//! - リポジトリはエンティティを検証しない（検証は呼び出し側の責務）
//! - トランザクション外の読み取りは `Store` 自身のリポジトリを使う
//!
//! # 実装
//! - **InMemoryStore**: 開発・テスト用（`impls::inmem_store`）

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::{
    Agent, AgentId, AuditEntry, AuthScope, ForemanError, IdentityScope, Job, JobId, Page,
    PageRequest, Result, Service, ServiceId,
};
use crate::observability::JobCounts;

/// JobRepository は Job の永続化
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>>;

    /// 既存の Job を上書き。存在しなければ NotFound
    async fn save(&self, job: &Job) -> Result<()>;

    /// 新しい Job を登録
    ///
    /// 同じ service_id に active（Pending / Processing）な Job がある場合は
    /// InvalidInput を返す
    async fn create(&self, job: &Job) -> Result<()>;

    async fn delete(&self, id: JobId) -> Result<()>;

    /// scope に見える Job を created_at 昇順で返す
    async fn list(&self, scope: &IdentityScope, page: &PageRequest) -> Result<Page<Job>>;

    /// agent 宛ての Pending Job。priority 降順、同順位は created_at 昇順
    async fn get_pending_jobs_for_agent(&self, agent_id: AgentId, limit: usize)
    -> Result<Vec<Job>>;

    /// Processing のまま claimed_at < now - older_than の Job
    async fn get_time_out_jobs(&self, older_than: Duration) -> Result<Vec<Job>>;

    /// Completed / Failed で updated_at < now - older_than の Job を削除し、件数を返す
    async fn delete_old_completed_jobs(&self, older_than: Duration) -> Result<usize>;

    /// Job の認可スコープを解決（Job 自身の provider / consumer / agent）
    async fn auth_scope(&self, id: JobId) -> Result<AuthScope>;

    async fn counts_by_state(&self) -> Result<JobCounts>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn find_by_id(&self, id: ServiceId) -> Result<Option<Service>>;

    async fn create(&self, service: &Service) -> Result<()>;

    async fn save(&self, service: &Service) -> Result<()>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>>;

    async fn create(&self, agent: &Agent) -> Result<()>;
}

#[async_trait]
pub trait AuditEntryRepository: Send + Sync {
    async fn create(&self, entry: &AuditEntry) -> Result<()>;

    /// entity_id に紐づく監査ログを作成順で返す
    async fn list_for_entity(&self, entity_id: &str) -> Result<Vec<AuditEntry>>;
}

/// Repositories はリポジトリ一式へのアクセス
///
/// `Store`（トランザクション外）と `Transaction`（トランザクション内）の
/// 両方が実装します。
pub trait Repositories: Send + Sync {
    fn jobs(&self) -> &dyn JobRepository;

    fn services(&self) -> &dyn ServiceRepository;

    fn agents(&self) -> &dyn AgentRepository;

    fn audit_entries(&self) -> &dyn AuditEntryRepository;
}

/// Store はトランザクションを開始できるリポジトリ一式
#[async_trait]
pub trait Store: Repositories {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// Transaction は unit of work
///
/// commit / rollback は self を消費するので、二重 commit はコンパイル時に防がれます。
/// commit されずに drop された場合は rollback と同じ扱いです。
#[async_trait]
pub trait Transaction: Repositories {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// トランザクション内で実行される処理の Future
pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 't>>;

/// `f` を 1 つのトランザクションで実行する
///
/// - `f` が Ok を返し、キャンセルされていなければ commit
/// - `f` がエラーを返すか、途中でキャンセルされたら rollback
/// - キャンセル時は `ForemanError::Cancelled`
///
/// # 使用例
/// ```ignore
/// let job = atomic(store, &cancel, move |tx| Box::pin(async move {
///     let mut job = tx.jobs().find_by_id(id).await?.ok_or_else(|| ...)?;
///     job.claim(now)?;
///     tx.jobs().save(&job).await?;
///     Ok(job)
/// })).await?;
/// ```
pub async fn atomic<T, F>(store: &dyn Store, cancel: &CancellationToken, f: F) -> Result<T>
where
    T: Send,
    F: for<'t> FnOnce(&'t dyn Transaction) -> TxFuture<'t, T> + Send,
{
    if cancel.is_cancelled() {
        return Err(ForemanError::Cancelled);
    }

    let tx = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ForemanError::Cancelled),
        tx = store.begin() => tx?,
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ForemanError::Cancelled),
        result = f(&*tx) => result,
    };

    match result {
        Ok(_) if cancel.is_cancelled() => {
            rollback_quietly(tx).await;
            Err(ForemanError::Cancelled)
        }
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            rollback_quietly(tx).await;
            Err(e)
        }
    }
}

// 元のエラーを優先し、rollback 自体の失敗はログだけ残す
async fn rollback_quietly(tx: Box<dyn Transaction>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "rollback failed");
    }
}
