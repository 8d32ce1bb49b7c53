//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存存储后端：外部键值存储之上的薄封装。

pub mod glob;
pub mod memory;
pub mod redis;
pub mod redis_provider;

use crate::error::Result;
use crate::keys::CacheKey;
use crate::metrics::GLOBAL_METRICS;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, instrument, warn};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// 按游标分批返回的键流
///
/// 每个元素是一次往返得到的一批键（可能为空），流结束表示游标回到起点
pub type KeyBatchStream = BoxStream<'static, Result<Vec<CacheKey>>>;

/// 缓存条目快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

/// 缓存存储特征
///
/// 所有 I/O 错误和超时都以 `CacheError::CacheUnavailable` 返回，
/// 调用方应将其视为未命中（fail open）。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 获取缓存值
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 设置缓存值并指定过期时间（秒）
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    /// 删除单个键
    async fn delete(&self, key: &str) -> Result<()>;

    /// 非阻塞地批量删除，返回实际删除的键数量
    async fn delete_many(&self, keys: &[CacheKey]) -> Result<u64>;

    /// 键的剩余生存时间（秒），不存在或无过期时间时返回 None
    async fn ttl(&self, key: &str) -> Result<Option<u64>>;

    /// 按 glob 模式分批扫描键
    ///
    /// 每批只处理有限数量的键，不会长时间阻塞存储
    fn scan_keys(&self, pattern: &str) -> KeyBatchStream;

    /// 检查连接是否正常
    async fn ping(&self) -> Result<()>;

    /// 后端名称，用于日志和状态输出
    fn backend_name(&self) -> &'static str;
}

/// 模式清扫结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 删除的键数量
    pub deleted: u64,
    /// 成功处理的批次数
    pub batches: u64,
    /// 删除失败的批次数
    pub failed_batches: u64,
    /// 扫描是否被错误中断
    pub interrupted: bool,
}

/// 删除所有匹配 `pattern` 的键
///
/// 逐批扫描、逐批删除，不会把全部匹配的键加载进内存。
/// 单个批次删除失败只记录日志，继续处理后续批次。
#[instrument(skip(store), level = "debug", fields(backend = store.backend_name()))]
pub async fn sweep(store: &dyn CacheStore, pattern: &str) -> SweepReport {
    let mut report = SweepReport::default();
    let mut batches = store.scan_keys(pattern);

    while let Some(batch) = batches.next().await {
        match batch {
            Ok(keys) if keys.is_empty() => {}
            Ok(keys) => match store.delete_many(&keys).await {
                Ok(deleted) => {
                    report.deleted += deleted;
                    report.batches += 1;
                }
                Err(e) => {
                    warn!(pattern, batch_len = keys.len(), "sweep batch delete failed: {}", e);
                    report.failed_batches += 1;
                }
            },
            Err(e) => {
                warn!(pattern, "sweep scan interrupted: {}", e);
                report.interrupted = true;
                break;
            }
        }
    }

    GLOBAL_METRICS.add("sweep_keys_deleted", report.deleted);
    debug!(
        "sweep finished: pattern={}, deleted={}, batches={}",
        pattern, report.deleted, report.batches
    );
    report
}
