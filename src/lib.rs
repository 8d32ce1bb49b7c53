//! tunecache - 音乐流媒体后端的旁路缓存与广播失效
//!
//! 读路径通过共享键值存储加速，写路径通过单一的发布/订阅频道把
//! 失效消息广播给所有协作进程，并对无法用固定键表达的分页列表执行模式清扫。

#![doc(html_root_url = "https://docs.rs/tunecache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod manager;
pub mod metrics;
pub mod serialization;
pub mod sync;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use backend::{CacheStore, MemoryStore, RedisStore};
pub use client::{BestEffort, ReadThroughCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use keys::CacheKey;
pub use manager::CacheManager;
pub use sync::{
    CacheResourceUpdater, InvalidationBus, InvalidationEvent, InvalidationPublisher,
    InvalidationSubscriber, LocalBus, RedisBus, ResourceInvalidationPolicy, ResourceKind,
};

/// tunecache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
