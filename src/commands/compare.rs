use super::{print_report, resolve_ignore_file};
use anyhow::{Context, Result};
use clap::Args;
use dirsync_lib::config::CompareSettings;
use dirsync_lib::core::{CompareEngine, ComparePhase, CompareProgress, CompareReport};
use dirsync_lib::IgnoreFilterStore;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Args)]
pub struct CompareArgs {
    /// 左侧目录
    pub left: PathBuf,
    /// 右侧目录
    pub right: PathBuf,

    /// 忽略规则文件
    #[arg(short, long)]
    pub ignores: Option<PathBuf>,

    /// 修改时间容差（秒），覆盖配置文件
    #[arg(short, long)]
    pub tolerance: Option<i64>,

    /// 输出 JSON
    #[arg(long)]
    pub json: bool,

    /// 同时列出相同的文件
    #[arg(long)]
    pub all: bool,

    /// 根目录不存在时按空目录处理
    #[arg(long)]
    pub allow_missing_root: bool,
}

pub async fn run(args: CompareArgs, config_dir: &Path) -> Result<()> {
    let report = compare(
        &args.left,
        &args.right,
        args.ignores.clone(),
        args.tolerance,
        args.allow_missing_root,
        !args.json,
        config_dir,
    )
    .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, args.all);
    }
    Ok(())
}

/// 加载规则并比较两个目录，Ctrl-C 取消
pub async fn compare(
    left: &Path,
    right: &Path,
    ignores: Option<PathBuf>,
    tolerance: Option<i64>,
    allow_missing_root: bool,
    show_progress: bool,
    config_dir: &Path,
) -> Result<CompareReport> {
    let mut settings = CompareSettings::load(config_dir);
    if let Some(tolerance) = tolerance {
        settings.time_tolerance_seconds = tolerance;
    }
    if allow_missing_root {
        settings.require_both_roots = false;
    }

    // 规则有误时在扫描开始前失败
    let ignore_file = resolve_ignore_file(config_dir, ignores)?;
    let store = IgnoreFilterStore::load(&ignore_file)
        .with_context(|| format!("加载忽略规则失败: {}", ignore_file.display()))?;

    let engine = CompareEngine::with_config(settings.engine_config());

    let cancel_flag = engine.cancel_flag();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("收到中断信号，正在取消...");
            cancel_flag.store(true, Ordering::SeqCst);
        }
    });

    let (progress_tx, printer) = if show_progress {
        let (tx, rx) = mpsc::channel(16);
        (Some(tx), Some(tokio::spawn(print_progress(rx))))
    } else {
        (None, None)
    };

    let result = engine.run(left, right, store.snapshot(), progress_tx).await;

    ctrl_c.abort();
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    result.with_context(|| format!("比较失败: {} <-> {}", left.display(), right.display()))
}

async fn print_progress(mut rx: mpsc::Receiver<CompareProgress>) {
    while let Some(progress) = rx.recv().await {
        let done = matches!(
            progress.phase,
            ComparePhase::Completed | ComparePhase::Cancelled
        );
        eprint!(
            "\r扫描中: 左侧 {} 个文件, 右侧 {} 个文件, {} 条记录   ",
            progress.left_files, progress.right_files, progress.records
        );
        let _ = std::io::stderr().flush();
        if done {
            eprintln!();
            break;
        }
    }
}
