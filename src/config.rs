//! 应用配置模块
//!
//! 所有配置保存在配置目录下的 `config.json`，每个模块占一个顶层字段，
//! 各字段独立读取，缺失或损坏时使用默认值。

use crate::core::{CompareConfig, EngineConfig, ScanConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.json";

/// 比较配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompareSettings {
    /// 修改时间容差（秒）
    pub time_tolerance_seconds: i64,
    /// 每侧同时读取的目录数
    pub max_concurrent_dirs: usize,
    /// 扫描输出通道容量
    pub channel_capacity: usize,
    /// 同时执行的复制/删除数
    pub max_concurrent_resolutions: usize,
    /// 任一根目录不存在时是否中止
    pub require_both_roots: bool,
}

impl Default for CompareSettings {
    fn default() -> Self {
        Self {
            time_tolerance_seconds: 2, // FAT 文件系统的时间精度
            max_concurrent_dirs: 8,
            channel_capacity: 1024,
            max_concurrent_resolutions: 4,
            require_both_roots: true,
        }
    }
}

impl CompareSettings {
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "compare")
    }

    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        save_section(config_dir, "compare", self)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            scan: ScanConfig {
                max_concurrent: self.max_concurrent_dirs.max(1),
                channel_capacity: self.channel_capacity.max(1),
            },
            compare: CompareConfig {
                time_tolerance_seconds: self.time_tolerance_seconds,
            },
            require_both_roots: self.require_both_roots,
            progress_interval: Duration::from_millis(200),
        }
    }
}

/// 读取 `config.json` 中的某个字段
pub fn load_section<T: DeserializeOwned + Default>(config_dir: &Path, name: &str) -> T {
    let config_file = config_dir.join(CONFIG_FILE);
    fs::read_to_string(&config_file)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|mut config| config.get_mut(name).map(serde_json::Value::take))
        .and_then(|section| serde_json::from_value::<T>(section).ok())
        .unwrap_or_default()
}

/// 更新 `config.json` 中的某个字段，保留其它字段
pub fn save_section<T: Serialize>(config_dir: &Path, name: &str, value: &T) -> io::Result<()> {
    fs::create_dir_all(config_dir)?;
    let config_file = config_dir.join(CONFIG_FILE);

    // 读取现有配置
    let mut config: serde_json::Value = if config_file.exists() {
        let content = fs::read_to_string(&config_file)?;
        serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        serde_json::json!({})
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[name] = serde_json::to_value(value).map_err(io::Error::other)?;

    let content = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
    fs::write(&config_file, content)
}

/// 配置目录：优先使用 `DIRSYNC_HOME`
pub fn config_dir() -> PathBuf {
    std::env::var_os("DIRSYNC_HOME")
        .map(PathBuf::from)
        .or_else(|| crate::dirs::config_dir().map(|p| p.join("dirsync")))
        .unwrap_or_else(|| PathBuf::from(".dirsync"))
}

/// 默认的忽略规则文件
pub fn default_ignore_file(config_dir: &Path) -> PathBuf {
    config_dir.join("ignores").join("default.ignores")
}
