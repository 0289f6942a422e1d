//! InMemoryStore - 開発・テスト用の Store
//!
//! # 実装詳細
//! - 全エンティティを 1 つの `StoreState` に持ち、`tokio::sync::Mutex` で保護
//! - トランザクションは開始時に Mutex を所有ロック（OwnedMutexGuard）し、
//!   Job / Service / Agent のコピーに対して書き込む
//! - 監査ログは追記のみなのでコピーせず、トランザクション中の追記分だけを持つ
//! - commit でコピーを正本に書き戻して追記分を連結し、rollback / drop では捨てる
//!
//! トランザクションは完全に直列化されます（行ロックより強い）。
//! トランザクション実行中に `Store` 側のリポジトリを使うとデッドロックするので、
//! 必ず `Transaction` のリポジトリを使ってください。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::{
    Agent, AgentId, AuditEntry, AuthScope, ForemanError, IdentityScope, Job, JobId, JobState,
    Page, PageRequest, Result, Service, ServiceId, validate_auth_scope,
};
use crate::observability::JobCounts;
use crate::ports::{
    AgentRepository, AuditEntryRepository, Clock, JobRepository, Repositories,
    ServiceRepository, Store, Transaction,
};

#[derive(Debug, Clone, Default)]
struct StoreState {
    jobs: HashMap<JobId, Job>,
    services: HashMap<ServiceId, Service>,
    agents: HashMap<AgentId, Agent>,
    audit_entries: Vec<AuditEntry>,
}

/// 1 つの `StoreState` に対するリポジトリ実装
///
/// Store 本体とトランザクションのステージング領域の両方で使います。
#[derive(Clone)]
struct InMemoryRepos {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRepos {
    fn new(state: StoreState, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            clock,
        }
    }

    /// `now - older_than`。表現できる時刻より前になる場合は None（該当する Job なし）
    fn cutoff(&self, older_than: Duration) -> Option<DateTime<Utc>> {
        self.clock.now().checked_sub_signed(older_than)
    }
}

/// InMemoryStore は開発用の Store
///
/// # 使用例
/// ```ignore
/// let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(Arc::new(SystemClock)));
/// store.services().create(&service).await?;
/// ```
pub struct InMemoryStore {
    repos: InMemoryRepos,
}

impl InMemoryStore {
    /// `clock` はタイムアウト・保持期間の判定に使います
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            repos: InMemoryRepos::new(StoreState::default(), clock),
        }
    }
}

impl Repositories for InMemoryStore {
    fn jobs(&self) -> &dyn JobRepository {
        &self.repos
    }

    fn services(&self) -> &dyn ServiceRepository {
        &self.repos
    }

    fn agents(&self) -> &dyn AgentRepository {
        &self.repos
    }

    fn audit_entries(&self) -> &dyn AuditEntryRepository {
        &self.repos
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let committed = self.repos.state.clone().lock_owned().await;
        let snapshot = StoreState {
            jobs: committed.jobs.clone(),
            services: committed.services.clone(),
            agents: committed.agents.clone(),
            audit_entries: Vec::new(),
        };
        let staged = InMemoryRepos::new(snapshot, self.repos.clock.clone());
        Ok(Box::new(InMemoryTransaction {
            committed,
            staged,
            appended: Mutex::new(Vec::new()),
        }))
    }
}

struct InMemoryTransaction {
    committed: OwnedMutexGuard<StoreState>,
    staged: InMemoryRepos,
    // このトランザクションで追記された監査ログ
    appended: Mutex<Vec<AuditEntry>>,
}

impl Repositories for InMemoryTransaction {
    fn jobs(&self) -> &dyn JobRepository {
        &self.staged
    }

    fn services(&self) -> &dyn ServiceRepository {
        &self.staged
    }

    fn agents(&self) -> &dyn AgentRepository {
        &self.staged
    }

    fn audit_entries(&self) -> &dyn AuditEntryRepository {
        self
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction {
            mut committed,
            staged,
            appended,
        } = *self;
        let mut staged = staged.state.lock().await;
        let mut next = std::mem::take(&mut *staged);
        next.audit_entries = std::mem::take(&mut committed.audit_entries);
        next.audit_entries.extend(appended.into_inner());
        *committed = next;
        debug!("transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!("transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl JobRepository for InMemoryRepos {
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn save(&self, job: &Job) -> Result<()> {
        let mut state = self.state.lock().await;
        let slot = state
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| ForemanError::not_found("job", job.id))?;
        *slot = job.clone();
        Ok(())
    }

    async fn create(&self, job: &Job) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(ForemanError::InvalidInput(format!(
                "job {} already exists",
                job.id
            )));
        }
        if job.state.is_active()
            && let Some(active) = state
                .jobs
                .values()
                .find(|other| other.service_id == job.service_id && other.state.is_active())
        {
            return Err(ForemanError::InvalidInput(format!(
                "service {} already has active job {}",
                job.service_id, active.id
            )));
        }
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .jobs
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ForemanError::not_found("job", id))
    }

    async fn list(&self, scope: &IdentityScope, page: &PageRequest) -> Result<Page<Job>> {
        let state = self.state.lock().await;
        let mut visible: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| validate_auth_scope(scope, &job.auth_scope()).is_ok())
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(Page::slice(visible, page))
    }

    async fn get_pending_jobs_for_agent(
        &self,
        agent_id: AgentId,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let state = self.state.lock().await;
        let mut pending: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.agent_id == agent_id && job.state == JobState::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn get_time_out_jobs(&self, older_than: Duration) -> Result<Vec<Job>> {
        let Some(cutoff) = self.cutoff(older_than) else {
            return Ok(Vec::new());
        };
        let state = self.state.lock().await;
        let mut timed_out: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| {
                job.state == JobState::Processing
                    && job.claimed_at.is_some_and(|claimed| claimed < cutoff)
            })
            .cloned()
            .collect();
        timed_out.sort_by_key(|job| (job.claimed_at, job.id));
        Ok(timed_out)
    }

    async fn delete_old_completed_jobs(&self, older_than: Duration) -> Result<usize> {
        let Some(cutoff) = self.cutoff(older_than) else {
            return Ok(0);
        };
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state
            .jobs
            .retain(|_, job| !(job.state.is_terminal() && job.updated_at < cutoff));
        Ok(before - state.jobs.len())
    }

    async fn auth_scope(&self, id: JobId) -> Result<AuthScope> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(&id)
            .map(Job::auth_scope)
            .ok_or_else(|| ForemanError::not_found("job", id))
    }

    async fn counts_by_state(&self) -> Result<JobCounts> {
        let state = self.state.lock().await;
        Ok(state.jobs.values().map(|job| job.state).collect())
    }
}

#[async_trait]
impl ServiceRepository for InMemoryRepos {
    async fn find_by_id(&self, id: ServiceId) -> Result<Option<Service>> {
        let state = self.state.lock().await;
        Ok(state.services.get(&id).cloned())
    }

    async fn create(&self, service: &Service) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.services.contains_key(&service.id) {
            return Err(ForemanError::InvalidInput(format!(
                "service {} already exists",
                service.id
            )));
        }
        state.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn save(&self, service: &Service) -> Result<()> {
        let mut state = self.state.lock().await;
        let slot = state
            .services
            .get_mut(&service.id)
            .ok_or_else(|| ForemanError::not_found("service", service.id))?;
        *slot = service.clone();
        Ok(())
    }
}

#[async_trait]
impl AgentRepository for InMemoryRepos {
    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>> {
        let state = self.state.lock().await;
        Ok(state.agents.get(&id).cloned())
    }

    async fn create(&self, agent: &Agent) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.agents.contains_key(&agent.id) {
            return Err(ForemanError::InvalidInput(format!(
                "agent {} already exists",
                agent.id
            )));
        }
        state.agents.insert(agent.id, agent.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditEntryRepository for InMemoryRepos {
    async fn create(&self, entry: &AuditEntry) -> Result<()> {
        let mut state = self.state.lock().await;
        state.audit_entries.push(entry.clone());
        Ok(())
    }

    async fn list_for_entity(&self, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let state = self.state.lock().await;
        Ok(entries_for(state.audit_entries.iter(), entity_id))
    }
}

#[async_trait]
impl AuditEntryRepository for InMemoryTransaction {
    async fn create(&self, entry: &AuditEntry) -> Result<()> {
        self.appended.lock().await.push(entry.clone());
        Ok(())
    }

    /// commit 済みの監査ログに続けて、このトランザクションの追記分を返す
    async fn list_for_entity(&self, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let appended = self.appended.lock().await;
        Ok(entries_for(
            self.committed.audit_entries.iter().chain(appended.iter()),
            entity_id,
        ))
    }
}

fn entries_for<'a>(
    entries: impl Iterator<Item = &'a AuditEntry>,
    entity_id: &str,
) -> Vec<AuditEntry> {
    entries
        .filter(|entry| entry.refs.entity_id.as_deref() == Some(entity_id))
        .cloned()
        .collect()
}
