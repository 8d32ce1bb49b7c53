//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的共享缓存存储。

use super::redis_provider::{DefaultRedisProvider, RedisConnection, RedisProvider};
use super::{CacheStore, KeyBatchStream};
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use crate::keys::CacheKey;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use redis::aio::ConnectionManager;
use redis::FromRedisValue;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument};

/// Redis 存储
///
/// 所有命令共用一个自动重连的 `ConnectionManager`，每个命令都带超时
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    command_timeout: Duration,
    scan_batch_size: usize,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout", &self.command_timeout)
            .field("scan_batch_size", &self.scan_batch_size)
            .finish()
    }
}

/// 执行单条命令，超时视为存储不可用
async fn query<T: FromRedisValue>(
    cmd: &redis::Cmd,
    manager: &ConnectionManager,
    command_timeout: Duration,
) -> Result<T> {
    let mut conn = manager.clone();
    Ok(timeout(command_timeout, cmd.query_async::<T>(&mut conn)).await??)
}

impl RedisStore {
    pub fn new(manager: ConnectionManager, config: &RedisConfig) -> Self {
        Self {
            manager,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            scan_batch_size: config.scan_batch_size.max(1),
        }
    }

    /// 按配置建立连接并创建存储
    #[instrument(skip(config), level = "info", name = "init_redis_store", fields(mode = ?config.mode))]
    pub async fn connect(config: &RedisConfig) -> Result<(Self, RedisConnection)> {
        let connection = DefaultRedisProvider.connect(config).await?;
        let store = Self::new(connection.manager.clone(), config);
        Ok((store, connection))
    }

    async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        query(cmd, &self.manager, self.command_timeout).await
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = self.query(redis::cmd("GET").arg(key)).await?;
        debug!("redis get: key={}, found={}", key, value.is_some());
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.query::<()>(redis::cmd("SET").arg(key).arg(value).arg("EX").arg(ttl_secs))
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        self.query::<i64>(redis::cmd("DEL").arg(key)).await?;
        Ok(())
    }

    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    async fn delete_many(&self, keys: &[CacheKey]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("UNLINK");
        for key in keys {
            cmd.arg(key.as_str());
        }
        let deleted: i64 = self.query(&cmd).await?;
        Ok(deleted.max(0) as u64)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        // -2 表示不存在，-1 表示没有过期时间
        let ttl: i64 = self.query(redis::cmd("TTL").arg(key)).await?;
        Ok((ttl >= 0).then_some(ttl as u64))
    }

    fn scan_keys(&self, pattern: &str) -> KeyBatchStream {
        let manager = self.manager.clone();
        let command_timeout = self.command_timeout;
        let batch_size = self.scan_batch_size;
        let pattern = pattern.to_string();

        stream::try_unfold(Some(0u64), move |cursor| {
            let manager = manager.clone();
            let pattern = pattern.clone();
            async move {
                let Some(cursor) = cursor else {
                    return Ok(None);
                };
                let mut cmd = redis::cmd("SCAN");
                cmd.arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(batch_size);
                let (next, keys): (u64, Vec<String>) =
                    query(&cmd, &manager, command_timeout).await?;
                let batch = keys.into_iter().map(CacheKey::from_raw).collect();
                // 游标回到 0 表示遍历结束
                let next = (next != 0).then_some(next);
                Ok::<_, CacheError>(Some((batch, next)))
            }
        })
        .boxed()
    }

    async fn ping(&self) -> Result<()> {
        let pong: String = self.query(&redis::cmd("PING")).await?;
        debug!("redis ping: {}", pong);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
