use crate::core::filter::FilterSnapshot;
use crate::core::scanner::{ScannedFile, Side};
use crate::storage::FileMeta;
use chrono::TimeDelta;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 文件比较结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// 左侧更新
    LeftNewer,
    /// 右侧更新
    RightNewer,
    /// 修改时间在容差内
    Same,
    /// 只有左侧有
    LeftUnique,
    /// 只有右侧有
    RightUnique,
}

impl FileStatus {
    /// 左右互换后的结果
    pub fn mirrored(self) -> Self {
        match self {
            FileStatus::LeftNewer => FileStatus::RightNewer,
            FileStatus::RightNewer => FileStatus::LeftNewer,
            FileStatus::LeftUnique => FileStatus::RightUnique,
            FileStatus::RightUnique => FileStatus::LeftUnique,
            FileStatus::Same => FileStatus::Same,
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::LeftNewer => write!(f, "left_newer"),
            FileStatus::RightNewer => write!(f, "right_newer"),
            FileStatus::Same => write!(f, "same"),
            FileStatus::LeftUnique => write!(f, "left_unique"),
            FileStatus::RightUnique => write!(f, "right_unique"),
        }
    }
}

/// 用户选择的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    None,
    CopyLeftToRight,
    CopyRightToLeft,
    DeleteBoth,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::None => write!(f, "none"),
            Resolution::CopyLeftToRight => write!(f, "copy_left_to_right"),
            Resolution::CopyRightToLeft => write!(f, "copy_right_to_left"),
            Resolution::DeleteBoth => write!(f, "delete_both"),
        }
    }
}

/// 比较记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRecord {
    /// 相对路径，取首次出现时的写法
    pub key: String,
    pub left: Option<FileMeta>,
    pub right: Option<FileMeta>,
    pub status: FileStatus,
    #[serde(default)]
    pub resolution: Resolution,
    /// 左侧文件实际的相对路径，大小写可能与 key 不同
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_path: Option<String>,
}

impl ComparisonRecord {
    /// 只有 key 的记录，两侧实际路径均未知
    pub fn new(
        key: impl Into<String>,
        left: Option<FileMeta>,
        right: Option<FileMeta>,
        status: FileStatus,
    ) -> Self {
        Self {
            key: key.into(),
            left,
            right,
            status,
            resolution: Resolution::None,
            left_path: None,
            right_path: None,
        }
    }

    pub fn meta(&self, side: Side) -> Option<&FileMeta> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    /// 某一侧在磁盘上的相对路径，该侧没有文件时使用 key
    pub fn path(&self, side: Side) -> &str {
        let path = match side {
            Side::Left => self.left_path.as_deref(),
            Side::Right => self.right_path.as_deref(),
        };
        path.unwrap_or(self.key.as_str())
    }

    pub fn set_path(&mut self, side: Side, path: String) {
        match side {
            Side::Left => self.left_path = Some(path),
            Side::Right => self.right_path = Some(path),
        }
    }
}

/// 同一相对路径下左右两侧的文件
#[derive(Debug, Clone)]
pub struct FileGroup {
    pub key: String,
    pub left: Option<ScannedFile>,
    pub right: Option<ScannedFile>,
}

impl FileGroup {
    fn new(file: ScannedFile) -> Self {
        let mut group = Self {
            key: file.relative_path.clone(),
            left: None,
            right: None,
        };
        let side = file.side;
        *group.slot(side) = Some(file);
        group
    }

    fn slot(&mut self, side: Side) -> &mut Option<ScannedFile> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// 比较配置
#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// 时间容差（秒）
    pub time_tolerance_seconds: i64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            time_tolerance_seconds: 2,
        }
    }
}

/// 合并左右两侧的扫描结果并分类
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: CompareConfig,
}

impl Reconciler {
    pub fn new(time_tolerance_seconds: i64) -> Self {
        Self::with_config(CompareConfig {
            time_tolerance_seconds,
        })
    }

    pub fn with_config(config: CompareConfig) -> Self {
        Self { config }
    }

    /// 比较两侧都存在的文件。只看修改时间，容差内即认为相同，不比较大小。
    pub fn compare_files(&self, left: &FileMeta, right: &FileMeta) -> FileStatus {
        let tolerance = TimeDelta::seconds(self.config.time_tolerance_seconds.abs());
        let delta = left.modified - right.modified;

        if delta > tolerance {
            FileStatus::LeftNewer
        } else if delta < -tolerance {
            FileStatus::RightNewer
        } else {
            FileStatus::Same
        }
    }

    /// 由一组文件生成比较记录
    pub fn finalize(&self, group: FileGroup) -> ComparisonRecord {
        let left = group.left.as_ref().map(ScannedFile::meta);
        let right = group.right.as_ref().map(ScannedFile::meta);

        let status = match (&left, &right) {
            (Some(l), Some(r)) => {
                let status = self.compare_files(l, r);
                if status == FileStatus::Same && l.size != r.size {
                    debug!(
                        "修改时间相同但大小不同: {} (left={}, right={})",
                        group.key, l.size, r.size
                    );
                }
                status
            }
            (Some(_), None) => FileStatus::LeftUnique,
            (None, Some(_)) => FileStatus::RightUnique,
            (None, None) => unreachable!("FileGroup 至少包含一侧的文件"),
        };

        ComparisonRecord {
            key: group.key,
            left,
            right,
            status,
            resolution: Resolution::None,
            left_path: group.left.map(|f| f.relative_path),
            right_path: group.right.map(|f| f.relative_path),
        }
    }

    /// 合并两个扫描流。两个流都结束后才返回，结果与到达顺序无关；
    /// 分组顺序为路径首次出现的顺序。
    pub async fn merge<L, R>(left: L, right: R) -> Vec<FileGroup>
    where
        L: Stream<Item = ScannedFile>,
        R: Stream<Item = ScannedFile>,
    {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<FileGroup> = Vec::new();
        let mut merged = std::pin::pin!(stream::select(left, right));

        while let Some(file) = merged.next().await {
            // 路径比较不区分大小写
            let folded = file.relative_path.to_lowercase();
            match index.get(&folded) {
                Some(&i) => {
                    let slot = groups[i].slot(file.side);
                    if let Some(existing) = slot.as_ref() {
                        warn!(
                            "{} 侧存在仅大小写不同的路径, 忽略 {} (保留 {})",
                            file.side, file.relative_path, existing.relative_path
                        );
                    } else {
                        *slot = Some(file);
                    }
                }
                None => {
                    index.insert(folded, groups.len());
                    groups.push(FileGroup::new(file));
                }
            }
        }

        groups
    }

    /// 合并并分类，返回比较记录流。记录在两个输入流都结束后才开始输出。
    pub fn reconcile<L, R>(&self, left: L, right: R) -> impl Stream<Item = ComparisonRecord> + Send
    where
        L: Stream<Item = ScannedFile> + Send + 'static,
        R: Stream<Item = ScannedFile> + Send + 'static,
    {
        let reconciler = self.clone();

        stream::once(async move {
            let groups = Self::merge(left, right).await;
            info!("合并完成: {} 个路径", groups.len());
            stream::iter(groups.into_iter().map(move |g| reconciler.finalize(g)))
        })
        .flatten()
    }

    /// 统计各状态数量
    pub fn summarize(records: &[ComparisonRecord]) -> StatusSummary {
        let mut summary = StatusSummary::default();

        for record in records {
            summary.total += 1;
            match record.status {
                FileStatus::Same => summary.same += 1,
                FileStatus::LeftNewer => summary.left_newer += 1,
                FileStatus::RightNewer => summary.right_newer += 1,
                FileStatus::LeftUnique => summary.left_unique += 1,
                FileStatus::RightUnique => summary.right_unique += 1,
            }
            summary.left_bytes += record.left.map(|m| m.size).unwrap_or(0);
            summary.right_bytes += record.right.map(|m| m.size).unwrap_or(0);
        }

        summary
    }
}

/// 移除已被忽略规则排除的记录，返回移除的数量
pub fn prune_ignored(records: &mut Vec<ComparisonRecord>, filters: &FilterSnapshot) -> usize {
    let before = records.len();
    records.retain(|r| !filters.is_excluded(&r.key));
    let removed = before - records.len();
    if removed > 0 {
        debug!("按忽略规则移除 {} 条记录", removed);
    }
    removed
}

/// 状态统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total: usize,
    pub same: usize,
    pub left_newer: usize,
    pub right_newer: usize,
    pub left_unique: usize,
    pub right_unique: usize,
    pub left_bytes: u64,
    pub right_bytes: u64,
}

impl StatusSummary {
    /// 需要处理的记录数（除 Same 以外）
    pub fn differences(&self) -> usize {
        self.total - self.same
    }
}
