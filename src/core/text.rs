//! 读取两侧文件文本，交给外部的文本对比窗口显示

use crate::error::Result;
use crate::storage::LocalStorage;
use serde::Serialize;
use std::path::Path;

/// 同一相对路径在两侧的文本内容，缺失的一侧为 None
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextPair {
    pub key: String,
    pub left: Option<String>,
    pub right: Option<String>,
}

pub async fn load_text_pair(left_root: &Path, right_root: &Path, key: &str) -> Result<TextPair> {
    let left = LocalStorage::new(left_root);
    let right = LocalStorage::new(right_root);

    let (left_text, right_text) = tokio::try_join!(left.read_text(key), right.read_text(key))?;

    Ok(TextPair {
        key: key.to_string(),
        left: left_text,
        right: right_text,
    })
}
