//! JobQueries - 読み取り系と保持期間の操作

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, instrument};

use crate::app::auditor::Auditor;
use crate::app::authz::{JobOperation, authorize};
use crate::app::context::CallContext;
use crate::domain::{
    AgentId, AuditRefs, AuthScope, EventType, ForemanError, Job, JobId, Page, PageRequest,
    Result,
};
use crate::observability::JobCounts;
use crate::ports::{Repositories, Store, atomic};

#[derive(Clone)]
pub struct JobQueries {
    store: Arc<dyn Store>,
    auditor: Auditor,
}

impl JobQueries {
    pub fn new(store: Arc<dyn Store>, auditor: Auditor) -> Self {
        Self { store, auditor }
    }

    pub async fn find(&self, ctx: &CallContext, job_id: JobId) -> Result<Job> {
        let identity = ctx.identity()?;
        let job = self
            .store
            .jobs()
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ForemanError::not_found("job", job_id))?;
        authorize(identity, JobOperation::Read, &job.auth_scope())?;
        Ok(job)
    }

    /// 呼び出し元のスコープに見える Job だけを返す
    pub async fn list(&self, ctx: &CallContext, page: PageRequest) -> Result<Page<Job>> {
        let identity = ctx.identity()?;
        page.validate()?;
        authorize(identity, JobOperation::List, &AuthScope::default())?;
        self.store.jobs().list(&identity.scope, &page).await
    }

    pub async fn counts(&self, ctx: &CallContext) -> Result<JobCounts> {
        let identity = ctx.identity()?;
        authorize(identity, JobOperation::Counts, &AuthScope::default())?;
        self.store.jobs().counts_by_state().await
    }

    /// Agent が次に実行すべき Pending の Job（priority 降順、古い順）
    #[instrument(skip(self, ctx), fields(agent_id = %agent_id))]
    pub async fn pending_jobs_for_agent(
        &self,
        ctx: &CallContext,
        agent_id: AgentId,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let identity = ctx.identity()?;
        let agent = self
            .store
            .agents()
            .find_by_id(agent_id)
            .await?
            .ok_or_else(|| ForemanError::not_found("agent", agent_id))?;
        authorize(identity, JobOperation::PollPending, &agent.auth_scope())?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let jobs = self
            .store
            .jobs()
            .get_pending_jobs_for_agent(agent_id, limit)
            .await?;
        debug!(count = jobs.len(), "pending jobs fetched");
        Ok(jobs)
    }

    /// claimed_at が `older_than` より前の Processing な Job
    pub async fn timed_out_jobs(&self, ctx: &CallContext, older_than: Duration) -> Result<Vec<Job>> {
        let identity = ctx.identity()?;
        authorize(identity, JobOperation::ListTimedOut, &AuthScope::default())?;
        if older_than < Duration::zero() {
            return Err(ForemanError::Validation(
                "timeout threshold cannot be negative".into(),
            ));
        }
        self.store.jobs().get_time_out_jobs(older_than).await
    }

    /// 終了から `older_than` 以上経った Job を削除し、件数を返す
    #[instrument(skip(self, ctx))]
    pub async fn purge_completed_jobs(
        &self,
        ctx: &CallContext,
        older_than: Duration,
    ) -> Result<usize> {
        let identity = ctx.identity()?.clone();
        authorize(&identity, JobOperation::Purge, &AuthScope::default())?;
        if older_than < Duration::zero() {
            return Err(ForemanError::Validation(
                "retention threshold cannot be negative".into(),
            ));
        }

        let auditor = self.auditor.clone();
        let purged = atomic(self.store.as_ref(), ctx.cancellation(), move |tx| {
            Box::pin(async move {
                let purged = tx.jobs().delete_old_completed_jobs(older_than).await?;
                if purged > 0 {
                    let properties = serde_json::json!({
                        "purged": purged,
                        "older_than_secs": older_than.num_seconds(),
                    });
                    auditor
                        .create(
                            tx.audit_entries(),
                            &identity,
                            EventType::JobsPurged,
                            Some(properties),
                            AuditRefs::default(),
                        )
                        .await?;
                }
                Ok(purged)
            })
        })
        .await?;

        info!(purged, "completed jobs purged");
        Ok(purged)
    }
}
