//! 基于本地目录的对象存储

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use application::storage::{ObjectStore, ObjectStoreError, StoredObject};
use async_trait::async_trait;

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ObjectStoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|err| ObjectStoreError::unavailable(format!("{}: {err}", root.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // 键只能是单层文件名
    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.starts_with('.');
        if !valid {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let path = self.path_for(key)?;
        if content_type != content_type_for(key) {
            tracing::debug!(key, content_type, "content type not derivable from key");
        }
        // 先写临时文件再改名，读者不会看到半个对象
        let tmp = self.root.join(format!(".{key}.partial"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|err| ObjectStoreError::unavailable(err.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|err| ObjectStoreError::unavailable(err.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, ObjectStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(StoredObject {
                bytes,
                content_type: content_type_for(key).to_string(),
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ObjectStoreError::unavailable(err.to_string())),
        }
    }
}
