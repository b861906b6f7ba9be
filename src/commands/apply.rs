use super::compare::compare;
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::*;
use dirsync_lib::config::CompareSettings;
use dirsync_lib::core::Resolution;
use dirsync_lib::ResolutionExecutor;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Args)]
pub struct ApplyArgs {
    /// 左侧目录
    pub left: PathBuf,
    /// 右侧目录
    pub right: PathBuf,

    /// 处理计划（JSON 数组）
    #[arg(short, long)]
    pub plan: PathBuf,

    /// 忽略规则文件
    #[arg(short, long)]
    pub ignores: Option<PathBuf>,

    /// 修改时间容差（秒），覆盖配置文件
    #[arg(short, long)]
    pub tolerance: Option<i64>,
}

/// 计划中的一项
#[derive(Debug, Deserialize)]
pub struct PlanEntry {
    pub key: String,
    pub resolution: Resolution,
}

pub fn load_plan(path: &Path) -> Result<Vec<PlanEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("无法读取计划文件 {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("计划文件格式错误 {}", path.display()))
}

pub async fn run(args: ApplyArgs, config_dir: &Path) -> Result<()> {
    let plan = load_plan(&args.plan)?;
    let settings = CompareSettings::load(config_dir);

    let mut report = compare(
        &args.left,
        &args.right,
        args.ignores.clone(),
        args.tolerance,
        false,
        true,
        config_dir,
    )
    .await?;
    if report.cancelled {
        bail!("比较被取消，未执行任何操作");
    }

    // 路径比较不区分大小写
    let mut wanted: HashMap<String, Resolution> = plan
        .into_iter()
        .map(|entry| (entry.key.to_lowercase(), entry.resolution))
        .collect();
    for record in report.records.iter_mut() {
        if let Some(resolution) = wanted.remove(&record.key.to_lowercase()) {
            record.resolution = resolution;
        }
    }
    for key in wanted.keys() {
        warn!("计划中的文件不在比较结果中: {}", key);
    }

    let executor = ResolutionExecutor::new(&args.left, &args.right)
        .with_concurrency(settings.max_concurrent_resolutions);
    let result = executor.apply(&mut report.records).await;

    println!(
        "复制 {} 个文件, 删除 {} 个文件",
        result.copied.to_string().green(),
        result.deleted.to_string().yellow()
    );
    for failure in &result.failures {
        println!(
            "{} {} ({}): {}",
            "失败".red(),
            failure.key,
            failure.resolution,
            failure.message
        );
    }

    if !result.is_success() {
        bail!("{} 个文件处理失败", result.failures.len());
    }
    Ok(())
}
