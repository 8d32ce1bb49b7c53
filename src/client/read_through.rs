//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了旁路缓存（cache-aside）的读路径实现。
//!
//! 读路径从不向调用方暴露缓存错误：存储不可用时直接计算，缓存内容损坏时
//! 视为未命中。并发的未命中各自计算、各自写入，以最后一次写入为准。

use super::BestEffort;
use crate::backend::{sweep, CacheStore, SweepReport};
use crate::keys::CacheKey;
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::{Serializer, SerializerEnum};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// 旁路缓存
#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn CacheStore>,
    serializer: SerializerEnum,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn CacheStore>, serializer: SerializerEnum) -> Self {
        Self { store, serializer }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// 读取缓存，未命中时计算并回写
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `ttl_secs` - 回写时使用的过期时间
    /// * `compute` - 计算当前值的异步函数，必须是幂等的
    ///
    /// # 返回值
    ///
    /// 命中时返回缓存值；否则返回 `compute` 的结果，`compute` 的错误原样返回
    #[instrument(skip(self, compute), level = "debug", fields(key = %key))]
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl_secs: u64,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut write_back = true;
        match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => match self.serializer.deserialize::<T>(&bytes) {
                Ok(value) => {
                    GLOBAL_METRICS.incr("read_hit");
                    debug!("cache hit for key: {}", key);
                    return Ok(value);
                }
                Err(e) => {
                    GLOBAL_METRICS.incr("read_corrupt");
                    warn!("corrupt cache entry for key {}, treating as miss: {}", key, e);
                }
            },
            Ok(None) => {
                GLOBAL_METRICS.incr("read_miss");
                debug!("cache miss for key: {}", key);
            }
            Err(e) => {
                // 存储不可用：直接计算，并跳过回写
                GLOBAL_METRICS.incr("read_unavailable");
                warn!("cache unavailable for key {}, computing directly: {}", key, e);
                write_back = false;
            }
        }

        let started = Instant::now();
        let value = compute().await?;
        GLOBAL_METRICS.incr("read_compute");
        GLOBAL_METRICS.record_duration("compute", started.elapsed().as_secs_f64());

        if write_back {
            self.set(key, &value, ttl_secs).await;
        }
        Ok(value)
    }

    /// 读取并反序列化缓存值，任何错误都视为未命中
    #[instrument(skip(self), level = "debug", fields(key = %key))]
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => match self.serializer.deserialize(&bytes) {
                Ok(value) => {
                    GLOBAL_METRICS.incr("read_hit");
                    Some(value)
                }
                Err(e) => {
                    GLOBAL_METRICS.incr("read_corrupt");
                    warn!("corrupt cache entry for key {}: {}", key, e);
                    None
                }
            },
            Ok(None) => {
                GLOBAL_METRICS.incr("read_miss");
                None
            }
            Err(e) => {
                GLOBAL_METRICS.incr("read_unavailable");
                warn!("cache unavailable for key {}: {}", key, e);
                None
            }
        }
    }

    /// 序列化并写入缓存值
    #[instrument(skip(self, value), level = "debug", fields(key = %key))]
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl_secs: u64) -> BestEffort {
        let result = match self.serializer.serialize(value) {
            Ok(bytes) => self.store.set(key.as_str(), bytes, ttl_secs).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => BestEffort::Stored,
            Err(e) => {
                GLOBAL_METRICS.incr("cache_write_failures");
                warn!("failed to write cache for key {}: {}", key, e);
                BestEffort::Failed(e)
            }
        }
    }

    /// 删除单个键
    pub async fn delete(&self, key: &CacheKey) -> BestEffort {
        match self.store.delete(key.as_str()).await {
            Ok(()) => BestEffort::Stored,
            Err(e) => {
                warn!("failed to delete cache key {}: {}", key, e);
                BestEffort::Failed(e)
            }
        }
    }

    /// 删除所有匹配模式的键
    pub async fn delete_by_pattern(&self, pattern: &str) -> SweepReport {
        sweep(self.store.as_ref(), pattern).await
    }
}
