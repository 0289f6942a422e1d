//! Implementations - ポートの実装
//!
//! # 実装一覧
//! - **inmem_store**: InMemoryStore（開発・テスト用の Store）

pub mod inmem_store;

pub use self::inmem_store::InMemoryStore;
