use super::resolve_ignore_file;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::*;
use dirsync_lib::IgnoreFilterStore;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct IgnoreFileArg {
    /// 忽略规则文件
    #[arg(short, long)]
    pub ignores: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum IgnoreCommand {
    /// 忽略一个目录（相对路径）
    AddDir {
        path: String,
        #[command(flatten)]
        file: IgnoreFileArg,
    },
    /// 忽略一个文件（相对路径）
    AddFile {
        path: String,
        #[command(flatten)]
        file: IgnoreFileArg,
    },
    /// 忽略任意位置的同名文件
    AddName {
        name: String,
        #[command(flatten)]
        file: IgnoreFileArg,
    },
    /// 显示某个相对路径命中的规则
    Test {
        path: String,
        #[command(flatten)]
        file: IgnoreFileArg,
    },
    /// 列出所有规则
    List {
        #[command(flatten)]
        file: IgnoreFileArg,
    },
}

fn open_store(config_dir: &Path, file: IgnoreFileArg) -> Result<IgnoreFilterStore> {
    let path = resolve_ignore_file(config_dir, file.ignores)?;
    IgnoreFilterStore::load(&path)
        .with_context(|| format!("加载忽略规则失败: {}", path.display()))
}

pub fn run(command: IgnoreCommand, config_dir: &Path) -> Result<()> {
    match command {
        IgnoreCommand::AddDir { path, file } => {
            let mut store = open_store(config_dir, file)?;
            let added = store.add_directory_rule(&path)?;
            finish_add(&store, added, &path)
        }
        IgnoreCommand::AddFile { path, file } => {
            let mut store = open_store(config_dir, file)?;
            let added = store.add_file_rule(&path)?;
            finish_add(&store, added, &path)
        }
        IgnoreCommand::AddName { name, file } => {
            let mut store = open_store(config_dir, file)?;
            let added = store.add_file_name_rule(&name)?;
            finish_add(&store, added, &name)
        }
        IgnoreCommand::Test { path, file } => {
            let store = open_store(config_dir, file)?;
            let explanation = store.snapshot().explain(&path);
            if !explanation.is_excluded() {
                println!("{} {}", "未忽略".green(), path);
                return Ok(());
            }
            println!("{} {}", "已忽略".yellow(), path);
            for (dir, pattern) in &explanation.directory_matches {
                println!("  目录 {} 命中 d: {}", dir, pattern);
            }
            for pattern in &explanation.file_matches {
                println!("  命中 f: {}", pattern);
            }
            Ok(())
        }
        IgnoreCommand::List { file } => {
            let store = open_store(config_dir, file)?;
            print!("{}", store.render());
            Ok(())
        }
    }
}

fn finish_add(store: &IgnoreFilterStore, added: bool, value: &str) -> Result<()> {
    if !added {
        println!("规则已存在: {}", value);
        return Ok(());
    }
    let count = store
        .save()
        .with_context(|| format!("保存忽略规则失败: {}", store.path().display()))?;
    println!("已添加 {}，共 {} 条规则", value.bold(), count);
    Ok(())
}
