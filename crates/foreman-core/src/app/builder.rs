//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - Clock / IdGenerator の差し替え（テストで固定時刻を使う）

use std::sync::Arc;

use crate::app::auditor::Auditor;
use crate::app::commander::JobCommander;
use crate::app::queries::JobQueries;
use crate::app::reaper::Reaper;
use crate::app::retention::RetentionSweeper;
use crate::config::EngineConfig;
use crate::domain::ForemanError;
use crate::ports::{Clock, IdGenerator, Store, SystemClock, UlidGenerator};

/// EngineBuilder はエンジンを構築
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new(store)
///     .config(EngineConfig::load("foreman.toml")?)
///     .build()?;
/// engine.commander.claim(&ctx, job_id).await?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に設定値を検証
/// - 不正な値があれば BuildError を返す（起動後に気づくことはない）
pub struct EngineBuilder {
    store: Arc<dyn Store>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: EngineConfig,
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[source] ForemanError),
}

impl EngineBuilder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            clock: None,
            ids: None,
            config: EngineConfig::default(),
        }
    }

    /// 省略時は SystemClock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 省略時は clock を使う UlidGenerator
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        self.config.validate().map_err(BuildError::InvalidConfig)?;
        let job_timeout = self.config.job_timeout().map_err(BuildError::InvalidConfig)?;
        let job_retention = self.config.job_retention().map_err(BuildError::InvalidConfig)?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(clock.clone())),
        };
        let auditor = Auditor::new(clock.clone(), ids.clone());

        let commander = JobCommander::new(self.store.clone(), clock, ids, auditor.clone());
        let queries = JobQueries::new(self.store, auditor);
        let reaper = Reaper::new(
            commander.clone(),
            queries.clone(),
            job_timeout,
            self.config.sweep_interval(),
        );
        let retention = RetentionSweeper::new(
            queries.clone(),
            job_retention,
            self.config.sweep_interval(),
        );

        Ok(Engine {
            commander,
            queries,
            reaper,
            retention,
            config: self.config,
        })
    }
}

/// Engine は構築済みのコンポーネント一式
pub struct Engine {
    pub commander: JobCommander,
    pub queries: JobQueries,
    pub reaper: Reaper,
    pub retention: RetentionSweeper,
    pub config: EngineConfig,
}
