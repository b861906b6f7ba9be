pub mod apply;
pub mod compare;
pub mod diff;
pub mod ignore;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dirsync_lib::config::default_ignore_file;
use dirsync_lib::core::{ensure_filter_file, CompareReport, FileStatus};
use dirsync_lib::storage::FileMeta;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dirsync", version, about = "比较两个目录并处理差异")]
pub struct Cli {
    /// 输出 debug 日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 配置目录（默认 $DIRSYNC_HOME 或系统配置目录下的 dirsync）
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 比较两个目录
    Compare(compare::CompareArgs),
    /// 比较后按计划文件复制 / 删除
    Apply(apply::ApplyArgs),
    /// 管理忽略规则
    #[command(subcommand)]
    Ignore(ignore::IgnoreCommand),
    /// 输出两侧同一文件的文本
    Diff(diff::DiffArgs),
}

/// 未指定忽略规则文件时使用默认文件，不存在则创建
pub fn resolve_ignore_file(config_dir: &Path, ignores: Option<PathBuf>) -> Result<PathBuf> {
    match ignores {
        Some(path) => Ok(path),
        None => {
            let path = default_ignore_file(config_dir);
            ensure_filter_file(&path)
                .with_context(|| format!("无法创建默认忽略规则文件 {}", path.display()))?;
            Ok(path)
        }
    }
}

fn format_meta(meta: Option<&FileMeta>) -> String {
    match meta {
        Some(m) => format!(
            "{:>12} {}",
            m.size,
            m.modified.format("%Y-%m-%d %H:%M:%S")
        ),
        None => format!("{:>32}", "-"),
    }
}

fn status_label(status: FileStatus) -> ColoredString {
    match status {
        FileStatus::Same => "same        ".normal(),
        FileStatus::LeftNewer => "left newer  ".green(),
        FileStatus::RightNewer => "right newer ".blue(),
        FileStatus::LeftUnique => "left only   ".yellow(),
        FileStatus::RightUnique => "right only  ".magenta(),
    }
}

/// 以表格形式输出比较结果
pub fn print_report(report: &CompareReport, include_same: bool) {
    for record in &report.records {
        if record.status == FileStatus::Same && !include_same {
            continue;
        }
        println!(
            "{} {} | {} | {}",
            status_label(record.status),
            format_meta(record.left.as_ref()),
            format_meta(record.right.as_ref()),
            record.key
        );
    }

    let summary = &report.summary;
    println!();
    println!(
        "{} 条记录. 仅左侧: {}. 仅右侧: {}. 左侧较新: {}. 右侧较新: {}. 相同: {}",
        summary.total.to_string().bold(),
        summary.left_unique.to_string().yellow(),
        summary.right_unique.to_string().magenta(),
        summary.left_newer.to_string().green(),
        summary.right_newer.to_string().blue(),
        summary.same,
    );
    if report.cancelled {
        println!("{}", "比较已取消，结果不完整".red());
    }
}
