//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（データベース、時計、ID 採番）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - Store が source of truth（正本）
//! - 状態遷移は必ず `store::atomic` のトランザクション内で行う
//! - 時刻と ID は注入する（テストで固定できるように）

pub mod clock;
pub mod id_generator;
pub mod store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::store::{
    AgentRepository, AuditEntryRepository, JobRepository, Repositories, ServiceRepository,
    Store, Transaction, TxFuture, atomic,
};
