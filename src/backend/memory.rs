//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内存储后端，语义与 Redis 后端一致。
//!
//! 过期时间基于 `tokio::time::Instant`，测试中可以通过暂停时钟来推进 TTL。

use super::glob::GlobPattern;
use super::{CacheEntry, CacheStore, KeyBatchStream};
use crate::config::DEFAULT_SCAN_BATCH_SIZE;
use crate::error::{CacheError, Result};
use crate::keys::CacheKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    created_at: DateTime<Utc>,
    ttl_secs: u64,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// 进程内存储
///
/// 克隆得到的实例共享同一份数据，可以模拟多个进程共享一个外部存储
#[derive(Clone, Debug)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, StoredValue>>>,
    scan_batch_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_BATCH_SIZE)
    }
}

/// SCAN 游标：按键的字典序推进
enum Cursor {
    Start,
    After(String),
    Done,
}

impl MemoryStore {
    pub fn new(scan_batch_size: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            scan_batch_size: scan_batch_size.max(1),
        }
    }

    /// 获取完整的条目快照（已过期的条目视为不存在）
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|stored| stored.is_live(Instant::now()))
            .map(|stored| CacheEntry {
                key: CacheKey::from_raw(key),
                value: stored.value.clone(),
                created_at: stored.created_at,
                ttl_secs: stored.ttl_secs,
            })
    }

    /// 当前未过期的条目数量
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|stored| stored.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

}

#[async_trait]
impl CacheStore for MemoryStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(stored) if stored.is_live(now) => return Ok(Some(stored.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // 惰性删除过期条目
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|stored| !stored.is_live(now)) {
            entries.remove(key);
            debug!("memory store: key={} expired and removed", key);
        }
        Ok(None)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        // 与 Redis 的 SET EX 一致：0 和溢出的过期时间都被拒绝
        let expires_at = Some(ttl_secs)
            .filter(|ttl| *ttl > 0)
            .and_then(|ttl| Instant::now().checked_add(Duration::from_secs(ttl)))
            .ok_or_else(|| {
                CacheError::CacheUnavailable(format!(
                    "invalid expire time {} for key {}",
                    ttl_secs, key
                ))
            })?;
        let stored = StoredValue {
            value,
            created_at: Utc::now(),
            ttl_secs,
            expires_at,
        };
        self.entries.write().await.insert(key.to_string(), stored);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    async fn delete_many(&self, keys: &[CacheKey]) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let deleted = keys
            .iter()
            .filter_map(|key| entries.remove(key.as_str()))
            .filter(|stored| stored.is_live(now))
            .count();
        Ok(deleted as u64)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| (stored.expires_at - now).as_secs()))
    }

    fn scan_keys(&self, pattern: &str) -> KeyBatchStream {
        let matcher = match GlobPattern::new(pattern) {
            Ok(matcher) => matcher,
            Err(e) => return stream::once(async move { Err::<Vec<CacheKey>, _>(e) }).boxed(),
        };
        let entries = self.entries.clone();
        let batch_size = self.scan_batch_size;

        stream::try_unfold(Cursor::Start, move |cursor| {
            let entries = entries.clone();
            let matcher = matcher.clone();
            async move {
                let lower = match cursor {
                    Cursor::Done => return Ok(None),
                    Cursor::Start => Bound::Unbounded,
                    Cursor::After(last) => Bound::Excluded(last),
                };

                let now = Instant::now();
                let entries = entries.read().await;
                let mut visited = 0usize;
                let mut last_seen = None;
                let mut matched = Vec::new();
                for (key, stored) in entries.range((lower, Bound::Unbounded)) {
                    visited += 1;
                    if stored.is_live(now) && matcher.matches(key) {
                        matched.push(CacheKey::from_raw(key.clone()));
                    }
                    if visited >= batch_size {
                        last_seen = Some(key.clone());
                        break;
                    }
                }

                let next = match last_seen {
                    Some(last) => Cursor::After(last),
                    None => Cursor::Done,
                };
                Ok::<_, CacheError>(Some((matched, next)))
            }
        })
        .boxed()
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
