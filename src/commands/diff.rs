use anyhow::Result;
use clap::Args;
use colored::*;
use dirsync_lib::core::load_text_pair;
use std::path::PathBuf;

#[derive(Args)]
pub struct DiffArgs {
    pub left: PathBuf,
    pub right: PathBuf,
    /// 相对路径
    pub key: String,
}

pub async fn run(args: DiffArgs) -> Result<()> {
    let pair = load_text_pair(&args.left, &args.right, &args.key).await?;

    print_side(&format!("<<< {}", args.left.join(&pair.key).display()), pair.left.as_deref());
    print_side(&format!(">>> {}", args.right.join(&pair.key).display()), pair.right.as_deref());
    Ok(())
}

fn print_side(header: &str, text: Option<&str>) {
    println!("{}", header.bold());
    match text {
        Some(text) => {
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
        }
        None => println!("{}", "(不存在)".dimmed()),
    }
}
