//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: エンジンの構築とワイヤリング
//! - **JobCommander**: 状態を変える操作（request / claim / complete / fail / retry）
//! - **JobQueries**: 読み取り系と保持期間の操作
//! - **Reaper**: タイムアウトした Job の回収
//! - **RetentionSweeper**: 終了した Job の定期削除
//! - **Auditor**: 監査ログの作成

pub mod auditor;
pub mod authz;
pub mod builder;
pub mod commander;
pub mod context;
pub mod queries;
pub mod reaper;
pub mod retention;

#[cfg(test)]
pub(crate) mod fixtures;

// 主要な型を再エクスポート
pub use self::auditor::Auditor;
pub use self::authz::{JobOperation, authorize};
pub use self::builder::{BuildError, Engine, EngineBuilder};
pub use self::commander::{JobCommander, JobCompletion, TransitionRequest};
pub use self::context::CallContext;
pub use self::queries::JobQueries;
pub use self::reaper::{ReapReport, Reaper};
pub use self::retention::RetentionSweeper;
