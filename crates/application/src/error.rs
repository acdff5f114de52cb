use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::storage::ObjectStoreError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("object store error: {0}")]
    Storage(#[from] ObjectStoreError),
    #[error("authentication failed")]
    Authentication,
    /// 拉黑策略否决；发送方不会收到错误帧
    #[error("interaction blocked")]
    BlockedInteraction,
    #[error("user is not a member of this chat")]
    NotChannelMember,
    #[error("user not found")]
    UserNotFound,
    #[error("chat not found")]
    ChannelNotFound,
    #[error("failed to encode payload: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ApplicationError {
    /// 错误码，出现在协议错误帧与 HTTP 错误体中
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Domain(DomainError::ValidationError { .. }) => "INVALID_ARGUMENT",
            ApplicationError::Domain(DomainError::BusinessRuleViolation { .. }) => {
                "OPERATION_NOT_ALLOWED"
            }
            ApplicationError::Repository(RepositoryError::NotFound) => "NOT_FOUND",
            ApplicationError::Repository(RepositoryError::Conflict) => "CONFLICT",
            ApplicationError::Repository(RepositoryError::Storage { .. }) => "STORAGE_FAILURE",
            ApplicationError::Storage(_) => "STORAGE_FAILURE",
            ApplicationError::Authentication => "AUTHENTICATION_FAILED",
            ApplicationError::BlockedInteraction => "BLOCKED",
            ApplicationError::NotChannelMember => "NOT_CHAT_MEMBER",
            ApplicationError::UserNotFound => "USER_NOT_FOUND",
            ApplicationError::ChannelNotFound => "CHAT_NOT_FOUND",
            ApplicationError::Encoding(_) => "INTERNAL",
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
