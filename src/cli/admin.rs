//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了管理员操作命令的实现。

use crate::keys;
use crate::manager::CacheManager;
use crate::sync::ResourceKind;
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
pub struct InvalidateArgs {
    #[arg(short, long, help = "Resource kind (song, album, artist, search, autocomplete, topSongs, home, favorite)")]
    pub kind: String,

    #[arg(short, long, help = "Resource id or query")]
    pub id: Option<String>,

    #[arg(short = 'u', long = "viewer", help = "Viewer whose first page should be invalidated (repeatable)")]
    pub viewers: Vec<String>,

    #[arg(short, long, help = "Glob pattern to sweep instead of the default one")]
    pub pattern: Option<String>,

    #[arg(long, conflicts_with = "pattern", help = "Sweep every autocomplete query starting with this prefix")]
    pub prefix: Option<String>,

    #[arg(long, help = "Publish a delete event instead of an update")]
    pub delete: bool,
}

#[derive(Parser, Debug)]
pub struct SweepArgs {
    #[arg(short, long, help = "Glob pattern, e.g. 'songs:list:*'")]
    pub pattern: String,

    #[arg(short, long, help = "Skip the confirmation prompt")]
    pub yes: bool,
}

/// 解析要附带的清扫模式，`--prefix` 只对自动补全有效
fn sweep_pattern(kind: ResourceKind, args: &InvalidateArgs) -> Result<Option<String>> {
    match &args.prefix {
        Some(prefix) if kind == ResourceKind::Autocomplete => {
            Ok(Some(keys::autocomplete_prefix_pattern(prefix)))
        }
        Some(_) => anyhow::bail!("--prefix only applies to the autocomplete kind, got {}", kind),
        None => Ok(args.pattern.clone()),
    }
}

pub async fn execute_invalidate(manager: &CacheManager, args: &InvalidateArgs) -> Result<()> {
    let kind: ResourceKind = args.kind.parse()?;
    let id = args.id.as_deref();
    let pattern = sweep_pattern(kind, args)?;

    let event = if args.delete {
        let outcome = manager
            .updater()
            .delete_resource(kind, id, &args.viewers)
            .await?;
        if !outcome.published {
            anyhow::bail!("Failed to publish {}", outcome.event.event_type);
        }
        outcome.event
    } else {
        manager
            .publisher()
            .publish_resource_change(kind, id, &args.viewers, pattern.as_deref())
            .await
            .context("Failed to publish invalidation event")?
    };

    println!("Published {} on '{}'", event.event_type, manager.bus().channel());
    for key in &event.keys {
        println!("  - {}", key);
    }
    if let Some(pattern) = &event.pattern {
        println!("  sweep: {}", pattern);
    }
    Ok(())
}

pub async fn execute_sweep(manager: &CacheManager, args: &SweepArgs) -> Result<()> {
    if !args.yes {
        print!("Delete every key matching '{}'? [y/N]: ", args.pattern);
        std::io::Write::flush(&mut std::io::stdout())?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim().to_lowercase() != "y" {
            println!("Operation cancelled.");
            return Ok(());
        }
    }

    let report = manager.cache().delete_by_pattern(&args.pattern).await;
    println!(
        "Deleted {} keys in {} batches ({} failed batches)",
        report.deleted, report.batches, report.failed_batches
    );
    if report.interrupted {
        anyhow::bail!("Sweep of '{}' was interrupted by a scan error", args.pattern);
    }
    Ok(())
}
