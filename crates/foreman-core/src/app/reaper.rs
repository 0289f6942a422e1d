//! Reaper - タイムアウトした Job の回収
//!
//! # フロー
//! 1. `timed_out_jobs` で claimed_at が閾値より古い Processing の Job を取得
//! 2. それぞれを commander 経由で fail（"job timed out"）
//! 3. Service 側には失敗が記録され、target_state は残る（retry 可能）
//!
//! システム管理者の Identity で実行します。

use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::app::commander::JobCommander;
use crate::app::context::CallContext;
use crate::app::queries::JobQueries;
use crate::domain::{Identity, Result};

pub const TIMEOUT_MESSAGE: &str = "job timed out";

/// 1 回の sweep の結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub reaped: usize,
    /// 回収前に他の呼び出しで状態が変わっていた Job
    pub skipped: usize,
}

pub struct Reaper {
    commander: JobCommander,
    queries: JobQueries,
    timeout: Duration,
    interval: StdDuration,
}

impl Reaper {
    pub fn new(
        commander: JobCommander,
        queries: JobQueries,
        timeout: Duration,
        interval: StdDuration,
    ) -> Self {
        Self {
            commander,
            queries,
            timeout,
            interval,
        }
    }

    fn system_context(cancel: &CancellationToken) -> CallContext {
        CallContext::new(Identity::admin("system:reaper", "reaper")).with_cancellation(cancel.clone())
    }

    #[instrument(skip(self, cancel))]
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<ReapReport> {
        let ctx = Self::system_context(cancel);
        let jobs = self.queries.timed_out_jobs(&ctx, self.timeout).await?;

        let mut report = ReapReport::default();
        for job in jobs {
            match self.commander.fail(&ctx, job.id, TIMEOUT_MESSAGE).await {
                Ok(_) => report.reaped += 1,
                // complete / fail と競合した。勝った側の結果を尊重する
                Err(e) if e.is_caller_error() => {
                    warn!(job_id = %job.id, error = %e, "timed-out job changed before reaping");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if report.reaped > 0 || report.skipped > 0 {
            info!(reaped = report.reaped, skipped = report.skipped, "reaper sweep finished");
        }
        Ok(report)
    }

    /// `cancel` が発火するまで一定間隔で sweep する
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.sweep(&cancel).await {
                Ok(_) => {}
                Err(crate::domain::ForemanError::Cancelled) => break,
                Err(e) => warn!(error = %e, "reaper sweep failed"),
            }
        }
        info!("reaper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::fixtures::Fixture;
    use crate::domain::{JobAction, JobState, ServiceState};
    use tracing_test::traced_test;

    #[tokio::test]
    async fn sweep_fails_only_jobs_past_the_timeout() {
        let fx = Fixture::new().await;
        let stuck = fx.service(ServiceState::Stopped).await;
        let fresh = fx.service(ServiceState::Stopped).await;
        let stuck_job = fx.request(&stuck, JobAction::Start).await;
        let fresh_job = fx.request(&fresh, JobAction::Start).await;

        fx.engine.commander.claim(&fx.agent_ctx(), stuck_job.id).await.unwrap();
        fx.clock.advance(fx.config.job_timeout().unwrap());
        fx.engine.commander.claim(&fx.agent_ctx(), fresh_job.id).await.unwrap();
        fx.clock.advance(Duration::seconds(1));

        let report = fx.engine.reaper.sweep(&CancellationToken::new()).await.unwrap();
        assert_eq!(report, ReapReport { reaped: 1, skipped: 0 });

        let reaped = fx.stored_job(stuck_job.id).await;
        assert_eq!(reaped.state, JobState::Failed);
        assert_eq!(reaped.error_message.as_deref(), Some(TIMEOUT_MESSAGE));
        let service = fx.stored_service(stuck.id).await;
        assert_eq!(service.error_message.as_deref(), Some(TIMEOUT_MESSAGE));
        assert_eq!(service.target_state, Some(ServiceState::Running));

        assert_eq!(fx.stored_job(fresh_job.id).await.state, JobState::Processing);
    }

    #[tokio::test]
    #[traced_test]
    async fn run_stops_when_cancelled() {
        let fx = Fixture::new().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        fx.engine.reaper.run(cancel).await;

        assert!(logs_contain("reaper stopped"));
    }
}
