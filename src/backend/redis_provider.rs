//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis连接提供者接口和默认实现。
//!
//! 连接在进程启动时建立一次，之后由存储和消息总线共享。

use crate::{
    config::{RedisConfig, RedisMode},
    error::{CacheError, Result},
    utils::redaction::redact_connection_string,
};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};
use tracing::info;

/// 进程级 Redis 连接
///
/// `client` 用于建立订阅连接，`manager` 是自动重连的多路复用命令连接
#[derive(Clone)]
pub struct RedisConnection {
    pub client: Client,
    pub manager: ConnectionManager,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RedisConnection")
    }
}

#[async_trait]
pub trait RedisProvider: Send + Sync {
    async fn get_standalone_client(&self, config: &RedisConfig) -> Result<RedisConnection>;
    async fn get_sentinel_client(&self, config: &RedisConfig) -> Result<RedisConnection>;

    /// 按配置的模式建立连接
    async fn connect(&self, config: &RedisConfig) -> Result<RedisConnection> {
        match config.mode {
            RedisMode::Standalone => self.get_standalone_client(config).await,
            RedisMode::Sentinel => self.get_sentinel_client(config).await,
        }
    }
}

pub struct DefaultRedisProvider;

/// 补全连接字符串中的 TLS 协议和密码
fn standalone_url(config: &RedisConfig) -> String {
    let raw = config.url.expose_secret();
    let mut url = if config.enable_tls && raw.starts_with("redis://") {
        raw.replacen("redis://", "rediss://", 1)
    } else {
        raw.to_string()
    };

    if let Some(password) = &config.password {
        if !url.contains('@') {
            if let Some(pos) = url.find("://") {
                url.insert_str(pos + 3, &format!(":{}@", password.expose_secret()));
            }
        }
    }
    url
}

async fn connection_manager(
    client: &Client,
    config: &RedisConfig,
    target: &str,
) -> Result<ConnectionManager> {
    match timeout(
        Duration::from_millis(config.connection_timeout_ms),
        client.get_connection_manager(),
    )
    .await
    {
        Ok(res) => Ok(res?),
        Err(_) => Err(CacheError::CacheUnavailable(format!(
            "Connection timed out after {}ms. Target: {}",
            config.connection_timeout_ms,
            redact_connection_string(target)
        ))),
    }
}

#[async_trait]
impl RedisProvider for DefaultRedisProvider {
    async fn get_standalone_client(&self, config: &RedisConfig) -> Result<RedisConnection> {
        let url = standalone_url(config);
        info!(
            "Connecting to Redis standalone at {}",
            redact_connection_string(&url)
        );

        let client = Client::open(url.as_str())
            .map_err(|e| CacheError::ConfigError(format!("Invalid Redis URL: {}", e)))?;
        let manager = connection_manager(&client, config, &url).await?;
        Ok(RedisConnection { client, manager })
    }

    async fn get_sentinel_client(&self, config: &RedisConfig) -> Result<RedisConnection> {
        let sentinel_config = config.sentinel.as_ref().ok_or_else(|| {
            CacheError::ConfigError("Sentinel configuration is missing".to_string())
        })?;

        // redis+sentinel://[:password@]host:port[,host:port]/service_name
        let mut url = "redis+sentinel://".to_string();
        if let Some(password) = &config.password {
            url.push_str(&format!(":{}@", password.expose_secret()));
        }

        let nodes: Vec<String> = sentinel_config
            .nodes
            .iter()
            .map(|n| {
                n.trim_start_matches("redis://")
                    .trim_start_matches("redis+sentinel://")
                    .to_string()
            })
            .collect();

        if nodes.is_empty() {
            return Err(CacheError::ConfigError(
                "No sentinel nodes provided".to_string(),
            ));
        }

        url.push_str(&nodes.join(","));
        url.push('/');
        url.push_str(&sentinel_config.master_name);

        info!(
            "Connecting to Redis via sentinel, master={}",
            sentinel_config.master_name
        );

        let client = Client::open(url.as_str())
            .map_err(|e| CacheError::ConfigError(format!("Invalid sentinel URL: {}", e)))?;
        let manager = connection_manager(&client, config, &url).await?;
        Ok(RedisConnection { client, manager })
    }
}
