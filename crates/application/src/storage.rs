//! 对象存储抽象
//!
//! 头像等二进制对象通过该接口写入外部存储；读取时以内联 data URL 的形式返回。

use async_trait::async_trait;
use data_encoding::BASE64;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
}

impl ObjectStoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl StoredObject {
    pub fn data_url(&self) -> String {
        data_url(&self.content_type, &self.bytes)
    }
}

/// 对象不存在时 `inline_url` 返回的占位值
pub const MISSING_OBJECT_URL: &str = "none";

pub fn data_url(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, BASE64.encode(bytes))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, ObjectStoreError>;

    /// 返回对象的内联 URL；对象缺失或读取失败时返回 `"none"`
    async fn inline_url(&self, key: &str) -> String {
        match self.get(key).await {
            Ok(Some(object)) => object.data_url(),
            Ok(None) => MISSING_OBJECT_URL.to_string(),
            Err(err) => {
                tracing::warn!(error = %err, key, "failed to read object");
                MISSING_OBJECT_URL.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_is_base64_encoded() {
        assert_eq!(data_url("image/jpeg", b"abc"), "data:image/jpeg;base64,YWJj");
    }
}
