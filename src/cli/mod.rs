//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use crate::manager::CacheManager;
use crate::telemetry::init_tracing;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tunecache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "status", about = "Check connectivity and show the effective configuration")]
    Status(StatusArgs),

    #[command(name = "invalidate", about = "Publish an invalidation event for a resource")]
    Invalidate(InvalidateArgs),

    #[command(name = "sweep", about = "Delete every key matching a glob pattern")]
    Sweep(SweepArgs),

    #[command(name = "inspect", about = "Show the cached value and TTL of a key")]
    Inspect(InspectArgs),

    #[command(name = "keys", about = "List keys matching a glob pattern")]
    Keys(KeysArgs),

    #[command(name = "listen", about = "Print invalidation events until interrupted")]
    Listen,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(short, long, help = "Show detailed information")]
    pub verbose: bool,
}

mod admin;
mod inspect;
mod status;

pub use admin::{InvalidateArgs, SweepArgs};
pub use inspect::{InspectArgs, KeysArgs};

/// 加载配置；未指定文件时使用默认配置
fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let config = Config::default();
            config
                .validate()
                .map_err(anyhow::Error::msg)
                .context("Default configuration is invalid")?;
            Ok(config)
        }
    }
}

/// 命令行工具只发布和管理，不启动失效订阅者
fn admin_config(cli: &Cli) -> Result<Config> {
    let mut config = load_config(cli.config.as_ref())?;
    config.invalidation.subscribe = false;
    Ok(config)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let config = admin_config(&cli)?;
    // status 在后端不可达时也要输出
    if let Commands::Status(args) = &cli.command {
        return status::execute(config, args).await;
    }

    let manager = CacheManager::init(config)
        .await
        .context("Failed to connect to the cache backend")?;
    let result = match &cli.command {
        Commands::Status(_) => Ok(()),
        Commands::Invalidate(args) => admin::execute_invalidate(&manager, args).await,
        Commands::Sweep(args) => admin::execute_sweep(&manager, args).await,
        Commands::Inspect(args) => inspect::execute_inspect(&manager, args).await,
        Commands::Keys(args) => inspect::execute_keys(&manager, args).await,
        Commands::Listen => inspect::execute_listen(&manager).await,
    };
    manager.shutdown().await;
    result
}
