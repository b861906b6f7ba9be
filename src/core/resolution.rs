//! 按用户选择执行复制 / 删除
//!
//! 每条记录独立执行，互不影响；失败的记录保留原来的处理方式，便于重试。

use crate::core::reconciler::{ComparisonRecord, FileStatus, Resolution};
use crate::core::scanner::Side;
use crate::error::Result;
use crate::storage::{FileMeta, LocalStorage};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// 单条记录的执行失败
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionFailure {
    pub key: String,
    pub resolution: Resolution,
    pub message: String,
}

/// 执行结果
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionReport {
    pub copied: usize,
    pub deleted: usize,
    pub failures: Vec<ResolutionFailure>,
}

impl ResolutionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Outcome {
    /// 复制后的元数据，以及目标侧和目标路径
    Copied(FileMeta, Side, String),
    Deleted,
}

/// 执行器
pub struct ResolutionExecutor {
    left: Arc<LocalStorage>,
    right: Arc<LocalStorage>,
    max_concurrent: usize,
}

impl ResolutionExecutor {
    pub fn new(left_root: impl Into<PathBuf>, right_root: impl Into<PathBuf>) -> Self {
        Self {
            left: Arc::new(LocalStorage::new(left_root)),
            right: Arc::new(LocalStorage::new(right_root)),
            max_concurrent: 4,
        }
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// 执行所有 `resolution != None` 的记录。
    /// 复制成功的记录变为 Same，删除成功的记录从列表中移除。
    pub async fn apply(&self, records: &mut Vec<ComparisonRecord>) -> ResolutionReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut spawned = HashSet::new();

        for (index, record) in records.iter().enumerate() {
            if record.resolution == Resolution::None {
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let left = self.left.clone();
            let right = self.right.clone();
            let left_key = record.path(Side::Left).to_string();
            let right_key = record.path(Side::Right).to_string();
            let resolution = record.resolution;

            spawned.insert(index);
            tasks.spawn(async move {
                let result =
                    Self::execute(&left, &right, &left_key, &right_key, resolution).await;
                drop(permit);
                (index, result)
            });
        }

        collect(tasks, spawned, records).await
    }

    async fn execute(
        left: &LocalStorage,
        right: &LocalStorage,
        left_key: &str,
        right_key: &str,
        resolution: Resolution,
    ) -> Result<Outcome> {
        match resolution {
            Resolution::CopyLeftToRight => {
                let meta = left.copy_to(left_key, right, right_key).await?;
                Ok(Outcome::Copied(meta, Side::Right, right_key.to_string()))
            }
            Resolution::CopyRightToLeft => {
                let meta = right.copy_to(right_key, left, left_key).await?;
                Ok(Outcome::Copied(meta, Side::Left, left_key.to_string()))
            }
            Resolution::DeleteBoth => {
                // 两侧分别删除，已不存在也算成功
                let left_result = left.delete(left_key).await;
                let right_result = right.delete(right_key).await;
                left_result?;
                right_result?;
                Ok(Outcome::Deleted)
            }
            Resolution::None => unreachable!("未选择处理方式的记录不会被执行"),
        }
    }
}

/// 汇总任务结果。没有返回结果的任务（panic 或被中止）也记为失败。
async fn collect(
    mut tasks: JoinSet<(usize, Result<Outcome>)>,
    mut pending: HashSet<usize>,
    records: &mut Vec<ComparisonRecord>,
) -> ResolutionReport {
    let mut report = ResolutionReport::default();
    let mut removed = HashSet::new();

    while let Some(joined) = tasks.join_next().await {
        let (index, result) = match joined {
            Ok(output) => output,
            Err(e) => {
                error!("处理任务异常: {}", e);
                continue;
            }
        };
        pending.remove(&index);
        let record = &mut records[index];

        match result {
            Ok(Outcome::Copied(meta, dest_side, dest_key)) => {
                record.left = Some(meta);
                record.right = Some(meta);
                record.set_path(dest_side, dest_key);
                record.status = FileStatus::Same;
                record.resolution = Resolution::None;
                report.copied += 1;
            }
            Ok(Outcome::Deleted) => {
                removed.insert(index);
                report.deleted += 1;
            }
            Err(e) => {
                warn!("处理失败 {} ({}): {}", record.key, record.resolution, e);
                report.failures.push(failure(record, e.to_string()));
            }
        }
    }

    let mut unfinished: Vec<_> = pending.into_iter().collect();
    unfinished.sort_unstable();
    for index in unfinished {
        let record = &records[index];
        warn!("处理未完成 {} ({})", record.key, record.resolution);
        report
            .failures
            .push(failure(record, "处理任务未正常结束".to_string()));
    }

    if !removed.is_empty() {
        let mut index = 0;
        records.retain(|_| {
            let keep = !removed.contains(&index);
            index += 1;
            keep
        });
    }

    info!(
        "处理完成: 复制 {}, 删除 {}, 失败 {}",
        report.copied,
        report.deleted,
        report.failures.len()
    );

    report
}

fn failure(record: &ComparisonRecord, message: String) -> ResolutionFailure {
    ResolutionFailure {
        key: record.key.clone(),
        resolution: record.resolution,
        message,
    }
}
