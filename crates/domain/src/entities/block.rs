//! 拉黑关系

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::UserId;

/// 有向拉黑边：`blocker` 拉黑了 `blocked`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRelation {
    pub blocker: UserId,
    pub blocked: UserId,
}

impl BlockRelation {
    pub fn new(blocker: UserId, blocked: UserId) -> DomainResult<Self> {
        if blocker == blocked {
            return Err(DomainError::validation_error("userId", "cannot block yourself"));
        }
        Ok(Self { blocker, blocked })
    }
}
