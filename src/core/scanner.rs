use crate::core::filter::FilterSnapshot;
use crate::error::{Error, Result};
use crate::storage::FileMeta;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// 比较的哪一侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// 扫描得到的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// 相对扫描根目录的路径，使用 `/` 分隔
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub side: Side,
}

impl ScannedFile {
    pub fn meta(&self) -> FileMeta {
        FileMeta::new(self.size, self.modified)
    }
}

/// 文件扫描器配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 同时读取的目录数上限
    pub max_concurrent: usize,
    /// 输出通道容量，满时扫描任务等待消费者
    pub channel_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            channel_capacity: 1024,
        }
    }
}

/// 扫描计数
#[derive(Debug, Default)]
pub struct ScanStats {
    pub files_emitted: AtomicU64,
    pub files_excluded: AtomicU64,
    pub dirs_scanned: AtomicU64,
    pub dirs_pruned: AtomicU64,
    pub dirs_unreadable: AtomicU64,
}

impl ScanStats {
    pub fn files_emitted(&self) -> u64 {
        self.files_emitted.load(Ordering::Relaxed)
    }
}

/// 扫描输出流，扫描在后台进行，消费者可以边扫边读
pub struct ScanStream {
    inner: ReceiverStream<ScannedFile>,
    stats: Arc<ScanStats>,
}

impl ScanStream {
    pub fn stats(&self) -> Arc<ScanStats> {
        self.stats.clone()
    }

    /// 不产生任何文件的流（用于缺失的根目录）
    pub fn empty() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self {
            inner: ReceiverStream::new(rx),
            stats: Arc::new(ScanStats::default()),
        }
    }
}

impl Stream for ScanStream {
    type Item = ScannedFile;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// 一次扫描共享的上下文
struct WalkContext {
    root: PathBuf,
    side: Side,
    filters: FilterSnapshot,
    tx: mpsc::Sender<ScannedFile>,
    cancel_flag: Option<Arc<AtomicBool>>,
    stats: Arc<ScanStats>,
}

impl WalkContext {
    /// 取消标志已设置，或消费者已经丢弃了流
    fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
            || self
                .cancel_flag
                .as_ref()
                .map(|f| f.load(Ordering::Relaxed))
                .unwrap_or(false)
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        relative_key(&self.root, path)
    }
}

/// 计算 `path` 相对 `root` 的路径键
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// 文件扫描器
pub struct FileScanner {
    config: ScanConfig,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl FileScanner {
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_config(ScanConfig {
            max_concurrent,
            ..Default::default()
        })
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self {
            config,
            cancel_flag: None,
        }
    }

    /// 设置取消标志，多个扫描器可共享同一个标志
    pub fn with_cancel(mut self, cancel_flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(cancel_flag);
        self
    }

    /// 开始扫描 `root`。根目录不存在时立即返回 `PathNotFound`，否则返回文件流。
    pub async fn scan(
        &self,
        root: impl AsRef<Path>,
        side: Side,
        filters: FilterSnapshot,
    ) -> Result<ScanStream> {
        let root = root.as_ref().to_path_buf();

        match fs::metadata(&root).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(Error::PathNotFound(root)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::PathNotFound(root))
            }
            Err(e) => return Err(e.into()),
        }

        info!("开始扫描 {} 侧: {}", side, root.display());

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let stats = Arc::new(ScanStats::default());
        let ctx = Arc::new(WalkContext {
            root,
            side,
            filters,
            tx,
            cancel_flag: self.cancel_flag.clone(),
            stats: stats.clone(),
        });

        tokio::spawn(walk(ctx, self.config.max_concurrent.max(1)));

        Ok(ScanStream {
            inner: ReceiverStream::new(rx),
            stats,
        })
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::with_config(ScanConfig::default())
    }
}

/// 调度循环：待扫描目录排队，最多 `max_concurrent` 个目录同时读取
async fn walk(ctx: Arc<WalkContext>, max_concurrent: usize) {
    let mut queue = VecDeque::from([ctx.root.clone()]);
    let mut in_flight: JoinSet<Vec<PathBuf>> = JoinSet::new();

    loop {
        while in_flight.len() < max_concurrent {
            if ctx.is_cancelled() {
                queue.clear();
                break;
            }
            let Some(dir) = queue.pop_front() else {
                break;
            };
            in_flight.spawn(read_directory(ctx.clone(), dir));
        }

        match in_flight.join_next().await {
            Some(Ok(subdirs)) => {
                if !ctx.is_cancelled() {
                    queue.extend(subdirs);
                }
            }
            Some(Err(e)) => warn!("目录扫描任务异常: {}", e),
            None => break,
        }
    }

    let stats = &ctx.stats;
    if ctx.is_cancelled() {
        info!(
            "{} 侧扫描已取消: 已输出 {} 个文件",
            ctx.side,
            stats.files_emitted()
        );
    } else {
        info!(
            "{} 侧扫描完成: {} 个文件, {} 个目录, {} 个文件被排除, {} 个目录被排除",
            ctx.side,
            stats.files_emitted(),
            stats.dirs_scanned.load(Ordering::Relaxed),
            stats.files_excluded.load(Ordering::Relaxed),
            stats.dirs_pruned.load(Ordering::Relaxed),
        );
    }
}

/// 读取单个目录：输出未被排除的文件，返回需要继续扫描的子目录
async fn read_directory(ctx: Arc<WalkContext>, dir: PathBuf) -> Vec<PathBuf> {
    let mut subdirs = Vec::new();

    // 目录在扫描过程中被删除或无权限访问时按空目录处理
    let mut entries = match fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("无法读取目录 {}: {}", dir.display(), e);
            ctx.stats.dirs_unreadable.fetch_add(1, Ordering::Relaxed);
            return subdirs;
        }
    };
    ctx.stats.dirs_scanned.fetch_add(1, Ordering::Relaxed);

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("读取目录条目失败 {}: {}", dir.display(), e);
                break;
            }
        };

        let path = entry.path();
        let Some(relative) = ctx.relative_path(&path) else {
            continue;
        };

        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(e) => {
                debug!("无法获取类型 {}: {}", relative, e);
                continue;
            }
        };

        if file_type.is_dir() {
            if ctx.filters.matches_directory(&relative) {
                debug!("排除目录: {}", relative);
                ctx.stats.dirs_pruned.fetch_add(1, Ordering::Relaxed);
            } else {
                subdirs.push(path);
            }
            continue;
        }

        if ctx.filters.matches_file(&relative) {
            debug!("排除文件: {}", relative);
            ctx.stats.files_excluded.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        // 符号链接取目标的元数据，指向目录的链接不跟随
        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                debug!("跳过非普通文件: {}", relative);
                continue;
            }
            Err(e) => {
                debug!("无法读取元数据 {}: {}", relative, e);
                continue;
            }
        };

        let modified = match metadata.modified() {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(e) => {
                debug!("无法读取修改时间 {}: {}", relative, e);
                continue;
            }
        };

        if ctx.is_cancelled() {
            break;
        }

        let file = ScannedFile {
            relative_path: relative,
            absolute_path: path,
            size: metadata.len(),
            modified,
            side: ctx.side,
        };

        if ctx.tx.send(file).await.is_err() {
            break;
        }
        ctx.stats.files_emitted.fetch_add(1, Ordering::Relaxed);
    }

    subdirs
}
