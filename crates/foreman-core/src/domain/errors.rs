//! Errors - エラー型と分類
//!
//! 呼び出し側が直せるエラー（Validation / InvalidInput / Unauthorized /
//! Unauthenticated / NotFound）と、ストレージ等のインフラエラーを区別します。
//! エンジン内部ではリトライしません。分類は `ErrorKind` で呼び出し側に伝えます。

use thiserror::Error;

/// ErrorKind は実行エラーの運用分類
///
/// - Transient: 一時的なエラー（再実行で通る可能性あり）
/// - Permanent: 恒久的なエラー（同じ入力での再実行は無意味）
/// - Infrastructure: インフラエラー（ストレージ・シリアライズの障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// ForemanError はドメインエラー
#[derive(Debug, Error)]
pub enum ForemanError {
    /// Malformed field value (empty name, unknown enum text, nil reference).
    #[error("validation error: {0}")]
    Validation(String),

    /// State precondition violated (wrong job state, service not in transition).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl ForemanError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ForemanError::Validation(_)
            | ForemanError::InvalidInput(_)
            | ForemanError::Unauthorized(_)
            | ForemanError::Unauthenticated(_)
            | ForemanError::NotFound { .. }
            | ForemanError::Config(_) => ErrorKind::Permanent,
            ForemanError::Cancelled => ErrorKind::Transient,
            ForemanError::Storage(_) | ForemanError::Serialization(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// True when the caller can fix the request and try again.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ForemanError::Validation(_)
                | ForemanError::InvalidInput(_)
                | ForemanError::Unauthorized(_)
                | ForemanError::Unauthenticated(_)
                | ForemanError::NotFound { .. }
        )
    }
}

pub type Result<T, E = ForemanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::validation(ForemanError::Validation("empty name".into()), ErrorKind::Permanent, true)]
    #[case::invalid_input(ForemanError::InvalidInput("job is not pending".into()), ErrorKind::Permanent, true)]
    #[case::unauthorized(ForemanError::Unauthorized("scope mismatch".into()), ErrorKind::Permanent, true)]
    #[case::not_found(ForemanError::not_found("job", "job-1"), ErrorKind::Permanent, true)]
    #[case::cancelled(ForemanError::Cancelled, ErrorKind::Transient, false)]
    #[case::storage(ForemanError::Storage("connection reset".into()), ErrorKind::Infrastructure, false)]
    fn classifies_errors(
        #[case] err: ForemanError,
        #[case] kind: ErrorKind,
        #[case] caller_error: bool,
    ) {
        assert_eq!(err.kind(), kind);
        assert_eq!(err.is_caller_error(), caller_error);
    }

    #[test]
    fn not_found_display_names_entity() {
        let err = ForemanError::not_found("service", "svc-42");
        assert_eq!(err.to_string(), "service not found: svc-42");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ForemanError>();
    }
}
