pub mod local;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;

pub use local::LocalStorage;

/// 文件元数据（大小 + 修改时间）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl FileMeta {
    pub fn new(size: u64, modified: DateTime<Utc>) -> Self {
        Self { size, modified }
    }

    pub fn from_metadata(metadata: &std::fs::Metadata) -> io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }
}
