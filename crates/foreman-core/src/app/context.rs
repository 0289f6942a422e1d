//! CallContext - 呼び出しごとのコンテキスト
//!
//! 認証済みの呼び出し元（Identity）とキャンセル用トークンを運びます。

use tokio_util::sync::CancellationToken;

use crate::domain::{ForemanError, Identity, Result};

#[derive(Debug, Clone)]
pub struct CallContext {
    identity: Option<Identity>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            cancel: CancellationToken::new(),
        }
    }

    /// 認証されていない呼び出し。状態を変える操作はすべて Unauthenticated になる
    pub fn anonymous() -> Self {
        Self {
            identity: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn identity(&self) -> Result<&Identity> {
        self.identity.as_ref().ok_or_else(|| {
            ForemanError::Unauthenticated("no identity attached to the call".into())
        })
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}
