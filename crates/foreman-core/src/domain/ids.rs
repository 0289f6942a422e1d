//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! すべての ID は ULID を内部に持ち、`Id<T>` の `T` はマーカー型です。
//! `JobId` と `ServiceId` は実行時には同じ 16 bytes ですが、コンパイル時に
//! 混同できません。
//!
//! nil ULID（すべて 0）は「未設定」として扱います。永続化層や入力境界で
//! 空の参照が紛れ込んだ場合、各エンティティの `validate()` がこれを拒否します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

use super::errors::ForemanError;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"job-", "svc-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// JSON 上では ULID 文字列そのものとして表現されます（プレフィックスなし）。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 未設定を表す nil ID
    pub fn nil() -> Self {
        Self::from_ulid(Ulid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.ulid.is_nil()
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// "job-01H..." と "01H..." の両方を受け付ける
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ForemanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|e| ForemanError::Validation(format!("invalid id '{s}': {e}")))
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Service {}

impl IdMarker for Service {
    fn prefix() -> &'static str {
        "svc-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Agent {}

impl IdMarker for Agent {
    fn prefix() -> &'static str {
        "agent-"
    }
}

/// Provider と Consumer はどちらも participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Participant {}

impl IdMarker for Participant {
    fn prefix() -> &'static str {
        "participant-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceGroup {}

impl IdMarker for ServiceGroup {
    fn prefix() -> &'static str {
        "group-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuditEntry {}

impl IdMarker for AuditEntry {
    fn prefix() -> &'static str {
        "audit-"
    }
}

// ========================================
// Type Alias
// ========================================

/// Identifier of a Job (one requested service transition).
pub type JobId = Id<Job>;

/// Identifier of a managed Service.
pub type ServiceId = Id<Service>;

/// Identifier of a remote execution Agent.
pub type AgentId = Id<Agent>;

/// Identifier of a tenant acting as provider and/or consumer.
pub type ParticipantId = Id<Participant>;

pub type ServiceGroupId = Id<ServiceGroup>;

pub type AuditEntryId = Id<AuditEntry>;
