//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存管理器，负责在进程启动时创建并持有所有长生命周期的缓存组件。

use crate::backend::{CacheStore, MemoryStore, RedisStore};
use crate::client::ReadThroughCache;
use crate::config::{BackendType, Config};
use crate::error::{CacheError, Result};
use crate::serialization::SerializerEnum;
use crate::sync::{
    CacheResourceUpdater, InvalidationBus, InvalidationPublisher, InvalidationSubscriber,
    LocalBus, RedisBus, ResourceInvalidationPolicy, SubscriberHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// 缓存管理器
///
/// 每个进程构建一次。存储与总线句柄以 `Arc` 的形式共享给请求代码，
/// 失效订阅者在 `init` 时启动，在 `shutdown` 时停止。
pub struct CacheManager {
    config: Config,
    store: Arc<dyn CacheStore>,
    bus: Arc<dyn InvalidationBus>,
    policy: ResourceInvalidationPolicy,
    cache: ReadThroughCache,
    publisher: InvalidationPublisher,
    updater: CacheResourceUpdater,
    subscriber: Option<SubscriberHandle>,
}

impl CacheManager {
    /// 初始化缓存管理器
    ///
    /// 根据配置连接存储与消息总线，并在需要时启动失效订阅者
    ///
    /// # 参数
    ///
    /// * `config` - 缓存系统配置
    #[instrument(skip(config), level = "info", fields(backend = ?config.backend))]
    pub async fn init(config: Config) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;

        let (store, bus): (Arc<dyn CacheStore>, Arc<dyn InvalidationBus>) = match config.backend
        {
            BackendType::Redis => {
                let (store, connection) = RedisStore::connect(&config.redis).await?;
                let bus = RedisBus::new(
                    &connection,
                    config.invalidation.channel.clone(),
                    Duration::from_millis(config.redis.command_timeout_ms),
                );
                (Arc::new(store), Arc::new(bus))
            }
            BackendType::Memory => (
                Arc::new(MemoryStore::new(config.redis.scan_batch_size)),
                Arc::new(LocalBus::new(config.invalidation.channel.clone())),
            ),
        };

        Self::with_backends(config, store, bus).await
    }

    /// 使用已有的存储与总线构建管理器
    pub async fn with_backends(
        config: Config,
        store: Arc<dyn CacheStore>,
        bus: Arc<dyn InvalidationBus>,
    ) -> Result<Self> {
        let policy = ResourceInvalidationPolicy::new();
        let serializer = SerializerEnum::from_config(&config.serialization);
        let cache = ReadThroughCache::new(store.clone(), serializer.clone());
        let publisher = InvalidationPublisher::new(bus.clone(), policy);
        let updater = CacheResourceUpdater::new(
            publisher.clone(),
            store.clone(),
            serializer,
            config.ttl.clone(),
            policy,
        );

        let subscriber = if config.invalidation.subscribe {
            let handle = InvalidationSubscriber::new(store.clone(), policy)
                .start(bus.as_ref())
                .await?;
            Some(handle)
        } else {
            None
        };

        info!(
            "CacheManager ready: store={}, channel={}, subscriber={}",
            store.backend_name(),
            bus.channel(),
            subscriber.is_some()
        );

        Ok(Self {
            config,
            store,
            bus,
            policy,
            cache,
            publisher,
            updater,
            subscriber,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn CacheStore> {
        self.store.clone()
    }

    pub fn bus(&self) -> Arc<dyn InvalidationBus> {
        self.bus.clone()
    }

    pub fn policy(&self) -> ResourceInvalidationPolicy {
        self.policy
    }

    /// 读路径
    pub fn cache(&self) -> &ReadThroughCache {
        &self.cache
    }

    pub fn publisher(&self) -> &InvalidationPublisher {
        &self.publisher
    }

    /// 写路径
    pub fn updater(&self) -> &CacheResourceUpdater {
        &self.updater
    }

    pub fn subscriber(&self) -> Option<&SubscriberHandle> {
        self.subscriber.as_ref()
    }

    /// 等待本进程的订阅者处理完 `count` 条消息
    ///
    /// 没有启动订阅者时立即返回
    pub async fn wait_for_invalidations(&self, count: u64) {
        if let Some(subscriber) = &self.subscriber {
            subscriber.wait_for(count).await;
        }
    }

    /// 优雅关闭
    ///
    /// 停止订阅者任务；存储与总线连接随管理器一起释放
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) {
        if let Some(subscriber) = &self.subscriber {
            subscriber.shutdown().await;
        }
        info!("CacheManager shut down");
    }
}
