//! RetentionSweeper - 終了した Job の定期削除

use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::context::CallContext;
use crate::app::queries::JobQueries;
use crate::domain::{ForemanError, Identity, Result};

pub struct RetentionSweeper {
    queries: JobQueries,
    retention: Duration,
    interval: StdDuration,
}

impl RetentionSweeper {
    pub fn new(queries: JobQueries, retention: Duration, interval: StdDuration) -> Self {
        Self {
            queries,
            retention,
            interval,
        }
    }

    /// 削除した件数を返す
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<usize> {
        let ctx = CallContext::new(Identity::admin("system:retention", "retention"))
            .with_cancellation(cancel.clone());
        self.queries.purge_completed_jobs(&ctx, self.retention).await
    }

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
                Err(ForemanError::Cancelled) => break,
                Err(e) => warn!(error = %e, "retention sweep failed"),
            }
        }
        info!("retention sweeper stopped");
    }
}
