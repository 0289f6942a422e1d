//! foreman-core
//!
//! Job dispatch and state coordination for remote execution agents.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, service, scope, audit, diff, errors）
//! - **ports**: 抽象化レイヤー（Store / Transaction, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（commander, queries, reaper, retention, builder）
//! - **impls**: 実装（InMemoryStore など開発用）
//! - **config**: `foreman.toml` の読み込み
//! - **observability**: 状態ごとの件数

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
