//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use tunecache::backend::{CacheStore, KeyBatchStream};
use tunecache::config::{BackendType, Config};
use tunecache::keys::CacheKey;
use tunecache::{CacheError, CacheManager, LocalBus, MemoryStore, Result};

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 测试使用的 Redis 地址
#[allow(dead_code)]
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// 检查Redis是否可用
#[allow(dead_code)]
pub async fn is_redis_available() -> bool {
    let client = match redis::Client::open(redis_url()) {
        Ok(c) => c,
        Err(_) => return false,
    };

    matches!(
        tokio::time::timeout(
            Duration::from_secs(1),
            client.get_multiplexed_async_connection(),
        )
        .await,
        Ok(Ok(_))
    )
}

/// 生成唯一的名称
///
/// 在基础名称后附加UUID，确保测试之间的隔离
#[allow(dead_code)]
pub fn generate_unique_name(base: &str) -> String {
    format!("{}_{}", base, uuid::Uuid::new_v4().simple())
}

#[allow(dead_code)]
pub fn viewers(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// 使用进程内后端、开启订阅者的配置
#[allow(dead_code)]
pub fn memory_config() -> Config {
    let mut config = Config {
        backend: BackendType::Memory,
        ..Default::default()
    };
    config.invalidation.subscribe = true;
    config
}

/// 共享同一个存储和频道的一组"进程"
#[allow(dead_code)]
pub struct Cluster {
    pub store: MemoryStore,
    pub bus: LocalBus,
}

#[allow(dead_code)]
impl Cluster {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(10),
            bus: LocalBus::new("cache:invalidate"),
        }
    }

    /// 启动一个新的进程实例
    pub async fn spawn_process(&self) -> CacheManager {
        CacheManager::with_backends(
            memory_config(),
            Arc::new(self.store.clone()),
            Arc::new(self.bus.connect()),
        )
        .await
        .expect("failed to start process")
    }
}

/// 始终不可用的存储
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingStore {
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::CacheUnavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl_secs: u64) -> Result<()> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        self.fail()
    }

    async fn delete_many(&self, _keys: &[CacheKey]) -> Result<u64> {
        self.fail()
    }

    async fn ttl(&self, _key: &str) -> Result<Option<u64>> {
        self.fail()
    }

    fn scan_keys(&self, _pattern: &str) -> KeyBatchStream {
        let result: Result<Vec<CacheKey>> = self.fail();
        Box::pin(futures::stream::once(async move { result }))
    }

    async fn ping(&self) -> Result<()> {
        self.fail()
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
