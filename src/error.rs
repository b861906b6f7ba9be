//! 错误类型

use std::path::PathBuf;
use thiserror::Error;

use crate::core::filter::RuleKind;

#[derive(Error, Debug)]
pub enum Error {
    /// 忽略规则文件内容无法解析
    #[error("忽略规则解析失败 {path}:{line}: {message}")]
    FilterParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// 忽略规则文件无法读取
    #[error("无法读取忽略规则文件 {path}: {source}")]
    FilterRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 某一类规则合并后的正则无效
    #[error("{kind} 规则编译失败: {source}")]
    InvalidPattern {
        kind: RuleKind,
        #[source]
        source: regex::Error,
    },

    #[error("路径不存在: {0}")]
    PathNotFound(PathBuf),

    /// 相对路径键不合法（绝对路径或包含 ..）
    #[error("无效的相对路径: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
