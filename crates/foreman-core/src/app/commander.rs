//! JobCommander - Job の状態遷移を Service と一緒に 1 トランザクションで行う
//!
//! # フロー（complete の例）
//! 1. 呼び出し元を認可（役割 + Job のスコープ）
//! 2. `atomic` 内で Job と Service を読み込む
//! 3. Job を遷移させて保存
//! 4. Service を遷移させて検証・保存
//! 5. Service の差分を監査ログに記録
//!
//! どこかで失敗すれば 2〜5 はすべて rollback されます。
//! 同じ操作を繰り返すと InvalidInput になり、状態は変わりません（暗黙の冪等性はなし）。

use std::sync::Arc;

use tracing::{info, instrument};

use crate::app::auditor::Auditor;
use crate::app::authz::{JobOperation, authorize};
use crate::app::context::CallContext;
use crate::domain::{
    AuditRefs, EventType, ForemanError, Identity, Job, JobAction, JobId, Result, Service,
    ServiceId,
};
use crate::ports::{Clock, IdGenerator, Repositories, Store, Transaction, atomic};

/// Agent からの完了報告
#[derive(Debug, Clone, Default)]
pub struct JobCompletion {
    /// Agent が払い出したリソース情報。None なら既存の値を保持
    pub resources: Option<serde_json::Value>,
    /// 外部システム側の ID。None なら既存の値を保持
    pub external_id: Option<String>,
}

/// Service に対する遷移要求
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub action: JobAction,
    pub priority: u32,
    pub target_properties: Option<serde_json::Value>,
}

impl TransitionRequest {
    pub fn new(action: JobAction) -> Self {
        Self {
            action,
            priority: 1,
            target_properties: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_target_properties(mut self, properties: serde_json::Value) -> Self {
        self.target_properties = Some(properties);
        self
    }
}

#[derive(Clone)]
pub struct JobCommander {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    auditor: Auditor,
}

impl JobCommander {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        auditor: Auditor,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            auditor,
        }
    }

    /// Service の遷移を開始し、それを実行する Pending の Job を作成
    #[instrument(skip(self, ctx, request), fields(service_id = %service_id, action = %request.action))]
    pub async fn request(
        &self,
        ctx: &CallContext,
        service_id: ServiceId,
        request: TransitionRequest,
    ) -> Result<Job> {
        let identity = ctx.identity()?.clone();
        let scope = self
            .store
            .services()
            .find_by_id(service_id)
            .await?
            .ok_or_else(|| ForemanError::not_found("service", service_id))?
            .auth_scope();
        authorize(&identity, JobOperation::Request, &scope)?;

        let clock = self.clock.clone();
        let ids = self.ids.clone();
        let auditor = self.auditor.clone();
        let job = atomic(self.store.as_ref(), ctx.cancellation(), move |tx| {
            Box::pin(async move {
                let mut service = load_service(tx, service_id).await?;
                let before = service.clone();
                let now = clock.now();

                service.request_transition(request.action, request.target_properties, now)?;
                service.validate()?;
                let job = Job::new(
                    ids.generate_job_id(),
                    request.action,
                    request.priority,
                    service.job_target(),
                    now,
                );
                job.validate()?;

                tx.services().save(&service).await?;
                tx.jobs().create(&job).await?;
                auditor
                    .create_with_diff(
                        tx.audit_entries(),
                        &identity,
                        EventType::TransitionRequested,
                        audit_refs(&service),
                        &before,
                        &service,
                    )
                    .await?;
                Ok(job)
            })
        })
        .await?;

        info!(job_id = %job.id, "transition requested");
        Ok(job)
    }

    /// Agent が Pending の Job を引き受ける。Service は変更しない
    #[instrument(skip(self, ctx), fields(job_id = %job_id))]
    pub async fn claim(&self, ctx: &CallContext, job_id: JobId) -> Result<Job> {
        self.authorize_job(ctx, JobOperation::Claim, job_id).await?;

        let clock = self.clock.clone();
        let job = atomic(self.store.as_ref(), ctx.cancellation(), move |tx| {
            Box::pin(async move {
                let mut job = load_job(tx, job_id).await?;
                job.claim(clock.now())?;
                tx.jobs().save(&job).await?;
                Ok(job)
            })
        })
        .await?;

        info!(agent_id = %job.agent_id, "job claimed");
        Ok(job)
    }

    /// Job を完了し、Service を target_state へ進める
    #[instrument(skip(self, ctx, completion), fields(job_id = %job_id))]
    pub async fn complete(
        &self,
        ctx: &CallContext,
        job_id: JobId,
        completion: JobCompletion,
    ) -> Result<Job> {
        let identity = self.authorize_job(ctx, JobOperation::Complete, job_id).await?;

        let clock = self.clock.clone();
        let auditor = self.auditor.clone();
        let job = atomic(self.store.as_ref(), ctx.cancellation(), move |tx| {
            Box::pin(async move {
                let mut job = load_job(tx, job_id).await?;
                let mut service = load_service(tx, job.service_id).await?;
                if !service.in_transition() {
                    return Err(ForemanError::InvalidInput(format!(
                        "service {} not in transition",
                        service.id
                    )));
                }
                let before = service.clone();
                let now = clock.now();

                job.complete(now)?;
                tx.jobs().save(&job).await?;

                service.handle_job_complete(completion.resources, completion.external_id, now)?;
                service.validate()?;
                tx.services().save(&service).await?;

                auditor
                    .create_with_diff(
                        tx.audit_entries(),
                        &identity,
                        EventType::JobCompleted,
                        audit_refs(&service),
                        &before,
                        &service,
                    )
                    .await?;
                Ok(job)
            })
        })
        .await?;

        info!(service_id = %job.service_id, "job completed");
        Ok(job)
    }

    /// Job を失敗させる。Service の target_state は残る
    #[instrument(skip(self, ctx, message), fields(job_id = %job_id))]
    pub async fn fail(
        &self,
        ctx: &CallContext,
        job_id: JobId,
        message: impl Into<String>,
    ) -> Result<Job> {
        let identity = self.authorize_job(ctx, JobOperation::Fail, job_id).await?;
        let message = message.into();

        let clock = self.clock.clone();
        let auditor = self.auditor.clone();
        let job = atomic(self.store.as_ref(), ctx.cancellation(), move |tx| {
            Box::pin(async move {
                let mut job = load_job(tx, job_id).await?;
                let mut service = load_service(tx, job.service_id).await?;
                let before = service.clone();
                let now = clock.now();

                job.fail(message.clone(), now)?;
                tx.jobs().save(&job).await?;

                service.handle_job_failure(message, job.action, now);
                service.validate()?;
                tx.services().save(&service).await?;

                auditor
                    .create_with_diff(
                        tx.audit_entries(),
                        &identity,
                        EventType::JobFailed,
                        audit_refs(&service),
                        &before,
                        &service,
                    )
                    .await?;
                Ok(job)
            })
        })
        .await?;

        info!(
            service_id = %job.service_id,
            error = job.error_message.as_deref().unwrap_or_default(),
            "job failed"
        );
        Ok(job)
    }

    /// 失敗した Job を Pending に戻し、Service の retry_count を増やす
    #[instrument(skip(self, ctx), fields(job_id = %job_id))]
    pub async fn retry(&self, ctx: &CallContext, job_id: JobId) -> Result<Job> {
        let identity = self.authorize_job(ctx, JobOperation::Retry, job_id).await?;

        let clock = self.clock.clone();
        let auditor = self.auditor.clone();
        let job = atomic(self.store.as_ref(), ctx.cancellation(), move |tx| {
            Box::pin(async move {
                let mut job = load_job(tx, job_id).await?;
                let mut service = load_service(tx, job.service_id).await?;
                if !service.in_transition() {
                    return Err(ForemanError::InvalidInput(format!(
                        "service {} not in transition",
                        service.id
                    )));
                }
                let before = service.clone();
                let now = clock.now();

                job.retry(now)?;
                tx.jobs().save(&job).await?;

                service.retry_count += 1;
                service.updated_at = now;
                service.validate()?;
                tx.services().save(&service).await?;

                auditor
                    .create_with_diff(
                        tx.audit_entries(),
                        &identity,
                        EventType::JobRetried,
                        audit_refs(&service),
                        &before,
                        &service,
                    )
                    .await?;
                Ok(job)
            })
        })
        .await?;

        info!(service_id = %job.service_id, "job retried");
        Ok(job)
    }

    // トランザクション外でスコープを解決してから認可する
    async fn authorize_job(
        &self,
        ctx: &CallContext,
        op: JobOperation,
        job_id: JobId,
    ) -> Result<Identity> {
        let identity = ctx.identity()?;
        let scope = self.store.jobs().auth_scope(job_id).await?;
        authorize(identity, op, &scope)?;
        Ok(identity.clone())
    }
}

async fn load_job(tx: &dyn Transaction, id: JobId) -> Result<Job> {
    tx.jobs()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ForemanError::not_found("job", id))
}

async fn load_service(tx: &dyn Transaction, id: ServiceId) -> Result<Service> {
    tx.services()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ForemanError::not_found("service", id))
}

fn audit_refs(service: &Service) -> AuditRefs {
    AuditRefs {
        entity_id: Some(service.id.to_string()),
        provider_id: Some(service.provider_id),
        agent_id: Some(service.agent_id),
        consumer_id: Some(service.consumer_id),
    }
}
