//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的日志初始化。

use crate::error::{CacheError, Result};
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志级别的环境变量
pub const LOG_ENV: &str = "TUNECACHE_LOG";

/// 未设置环境变量时的默认级别
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// 初始化全局 tracing subscriber
///
/// 日志过滤规则取自 `TUNECACHE_LOG`，未设置时为 `info`。
/// 进程中只能初始化一次，重复调用返回 `ConfigError`。
///
/// # 参数
///
/// * `json` - 是否输出 JSON 格式日志
pub fn init_tracing(json: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let fmt_layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| CacheError::ConfigError(format!("failed to install tracing subscriber: {}", e)))
}
