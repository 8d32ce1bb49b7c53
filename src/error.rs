//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 读路径上的错误一律在本地吸收（fail open），写路径上的
/// `UnsupportedResource` 属于编程错误，需要立即暴露给调用方。
#[derive(Error, Debug)]
pub enum CacheError {
    /// 存储或消息总线不可达、超时
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 缓存内容损坏，无法反序列化
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// 失效策略表中不存在的资源类型
    #[error("Unsupported resource: {0}")]
    UnsupportedResource(String),

    /// 订阅端收到的失效消息格式不正确
    #[error("Malformed invalidation event: {0}")]
    MalformedEvent(String),

    /// 无法解析的 glob 匹配模式
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    /// 同一进程重复订阅失效频道
    #[error("Invalidation channel already subscribed: {0}")]
    AlreadySubscribed(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CacheError {
    /// 是否属于基础设施故障（应当 fail open）
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::CacheUnavailable(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::CacheUnavailable(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CacheError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        CacheError::CacheUnavailable(format!("operation timed out: {}", err))
    }
}

/// 缓存操作结果类型别名
///
/// 简化错误处理，所有缓存操作都返回此类型
pub type Result<T> = std::result::Result<T, CacheError>;
