use crate::core::filter::FilterSnapshot;
use crate::core::reconciler::{CompareConfig, ComparisonRecord, Reconciler, StatusSummary};
use crate::core::scanner::{FileScanner, ScanConfig, ScanStats, ScanStream, Side};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 引擎配置
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    pub compare: CompareConfig,
    /// 根目录缺失时是否报错；为 false 时缺失的一侧按空目录处理
    pub require_both_roots: bool,
    /// 进度上报间隔
    pub progress_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            compare: CompareConfig::default(),
            require_both_roots: true,
            progress_interval: Duration::from_millis(200),
        }
    }
}

/// 比较阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparePhase {
    Scanning,
    Reconciling,
    Completed,
    Cancelled,
}

/// 比较进度
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareProgress {
    pub phase: ComparePhase,
    pub left_files: u64,
    pub right_files: u64,
    pub records: usize,
}

/// 比较报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareReport {
    pub left_root: PathBuf,
    pub right_root: PathBuf,
    pub records: Vec<ComparisonRecord>,
    pub summary: StatusSummary,
    pub left_files: u64,
    pub right_files: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    /// 被取消时 records 为已得到的部分结果
    pub cancelled: bool,
}

/// 比较引擎：加载好的规则 + 两侧扫描 + 合并
pub struct CompareEngine {
    config: EngineConfig,
    cancelled: Arc<AtomicBool>,
}

impl CompareEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 取消正在进行或即将开始的比较
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 检查是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 共享的取消标志
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// 运行一次比较。根目录校验失败会在开始扫描前返回错误。
    pub async fn run(
        &self,
        left_root: impl AsRef<Path>,
        right_root: impl AsRef<Path>,
        filters: FilterSnapshot,
        progress_tx: Option<mpsc::Sender<CompareProgress>>,
    ) -> Result<CompareReport> {
        let left_root = left_root.as_ref().to_path_buf();
        let right_root = right_root.as_ref().to_path_buf();
        let start_time = Utc::now();
        let started = Instant::now();

        info!(
            "开始比较: {} <-> {}",
            left_root.display(),
            right_root.display()
        );

        let scanner =
            FileScanner::with_config(self.config.scan.clone()).with_cancel(self.cancelled.clone());
        let opened = async {
            let left = self
                .open_side(&scanner, &left_root, Side::Left, filters.clone())
                .await?;
            let right = self
                .open_side(&scanner, &right_root, Side::Right, filters)
                .await?;
            Ok::<_, Error>((left, right))
        };
        let (left, right) = match opened.await {
            Ok(streams) => streams,
            Err(e) => {
                self.cancelled.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let left_stats = left.stats();
        let right_stats = right.stats();
        let records_emitted = Arc::new(AtomicUsize::new(0));

        // 定时上报扫描进度
        let progress_handle = progress_tx.clone().map(|tx| {
            let left_stats = left_stats.clone();
            let right_stats = right_stats.clone();
            let records_emitted = records_emitted.clone();
            let interval = self.config.progress_interval;

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    let records = records_emitted.load(Ordering::Relaxed);
                    let phase = if records > 0 {
                        ComparePhase::Reconciling
                    } else {
                        ComparePhase::Scanning
                    };
                    send_progress(&tx, phase, &left_stats, &right_stats, records);
                }
            })
        });

        let reconciler = Reconciler::with_config(self.config.compare.clone());
        let mut stream = std::pin::pin!(reconciler.reconcile(left, right));
        let mut records = Vec::new();
        while let Some(record) = stream.next().await {
            records.push(record);
            records_emitted.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(handle) = progress_handle {
            handle.abort();
        }

        // 本次运行结束后清除取消标志，运行前收到的取消同样生效
        let cancelled = self.cancelled.swap(false, Ordering::SeqCst);
        let summary = Reconciler::summarize(&records);
        let left_files = left_stats.files_emitted();
        let right_files = right_stats.files_emitted();

        if let Some(tx) = &progress_tx {
            let phase = if cancelled {
                ComparePhase::Cancelled
            } else {
                ComparePhase::Completed
            };
            send_progress(tx, phase, &left_stats, &right_stats, records.len());
        }

        if cancelled {
            info!("比较已取消: 得到 {} 条部分结果", records.len());
        } else {
            info!(
                "比较完成: {} 条记录, 相同 {}, 左侧较新 {}, 右侧较新 {}, 仅左侧 {}, 仅右侧 {}",
                summary.total,
                summary.same,
                summary.left_newer,
                summary.right_newer,
                summary.left_unique,
                summary.right_unique
            );
        }

        Ok(CompareReport {
            left_root,
            right_root,
            records,
            summary,
            left_files,
            right_files,
            start_time,
            end_time: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
            cancelled,
        })
    }

    async fn open_side(
        &self,
        scanner: &FileScanner,
        root: &Path,
        side: Side,
        filters: FilterSnapshot,
    ) -> Result<ScanStream> {
        match scanner.scan(root, side, filters).await {
            Ok(stream) => Ok(stream),
            Err(Error::PathNotFound(path)) if !self.config.require_both_roots => {
                warn!("{} 侧根目录不存在, 按空目录处理: {}", side, path.display());
                Ok(ScanStream::empty())
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for CompareEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 尽力发送进度，通道满时丢弃
fn send_progress(
    tx: &mpsc::Sender<CompareProgress>,
    phase: ComparePhase,
    left: &ScanStats,
    right: &ScanStats,
    records: usize,
) {
    let progress = CompareProgress {
        phase,
        left_files: left.files_emitted(),
        right_files: right.files_emitted(),
        records,
    };
    if let Err(e) = tx.try_send(progress) {
        debug!("进度未发送: {}", e);
    }
}
