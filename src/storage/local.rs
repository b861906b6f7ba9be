use super::FileMeta;
use crate::core::filter::normalize_relative;
use crate::error::{Error, Result};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// 以某个根目录为起点、按相对路径访问的本地存储
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let base_path = path.into();
        let name = format!("local:{}", base_path.display());
        Self { base_path, name }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 获取存储名称（用于日志）
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 相对路径 -> 绝对路径，拒绝绝对路径和 `..`
    pub fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        let normalized = normalize_relative(key);
        let relative = Path::new(&normalized);

        let valid = !normalized.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(Error::InvalidKey(key.to_string()));
        }

        Ok(self.base_path.join(relative))
    }

    /// 获取文件元数据，不存在或不是普通文件时返回 None
    pub async fn stat(&self, key: &str) -> Result<Option<FileMeta>> {
        let full_path = self.resolve_path(key)?;

        match fs::metadata(&full_path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(FileMeta::from_metadata(&metadata)?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 以文本读取文件，非 UTF-8 内容做有损转换；文件不存在时返回 None
    pub async fn read_text(&self, key: &str) -> Result<Option<String>> {
        let full_path = self.resolve_path(key)?;

        match fs::read(&full_path).await {
            Ok(data) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 把 `key` 复制到另一个存储的 `dest_key`，覆盖已有文件并保留修改时间。
    /// 两侧大小写可能不同，所以目标路径单独给出。返回源文件的元数据。
    pub async fn copy_to(
        &self,
        key: &str,
        dest: &LocalStorage,
        dest_key: &str,
    ) -> Result<FileMeta> {
        let source_path = self.resolve_path(key)?;
        let dest_path = dest.resolve_path(dest_key)?;

        let metadata = fs::metadata(&source_path).await?;
        let source_meta = FileMeta::from_metadata(&metadata)?;

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 先写临时文件，再重命名覆盖
        let temp_path = temp_path_for(&dest_path);
        let result = async {
            fs::copy(&source_path, &temp_path).await?;
            set_modified(&temp_path, metadata.modified()?).await?;
            fs::rename(&temp_path, &dest_path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!("已复制 {}:{} -> {}:{}", self.name, key, dest.name, dest_key);
        Ok(source_meta)
    }

    /// 删除文件，返回文件此前是否存在
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let full_path = self.resolve_path(key)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!("已删除 {}: {}", self.name, key);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.dirsync-tmp", file_name))
}

async fn set_modified(path: &Path, modified: std::time::SystemTime) -> io::Result<()> {
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await?
        .into_std()
        .await;

    tokio::task::spawn_blocking(move || file.set_modified(modified))
        .await
        .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path_rejects_escapes() {
        let storage = LocalStorage::new("/data/left");

        assert_eq!(
            storage.resolve_path("a/b.txt").unwrap(),
            PathBuf::from("/data/left").join("a/b.txt")
        );
        assert_eq!(
            storage.resolve_path("/a/b.txt").unwrap(),
            PathBuf::from("/data/left").join("a/b.txt")
        );
        assert!(storage.resolve_path("../secret").is_err());
        assert!(storage.resolve_path("a/../../secret").is_err());
        assert!(storage.resolve_path("").is_err());
    }

    #[test]
    fn test_temp_path_stays_in_directory() {
        let temp = temp_path_for(Path::new("/x/y/report.txt"));
        assert_eq!(temp, PathBuf::from("/x/y/.report.txt.dirsync-tmp"));
    }
}
