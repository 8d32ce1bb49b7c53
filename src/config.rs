//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use crate::sync::policy::ResourceKind;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_VERSION_FIELD: &str = "config_version";

/// 默认的失效频道名称
pub const DEFAULT_INVALIDATION_CHANNEL: &str = "cache:invalidate";

/// 默认的 SCAN 批次大小
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

const MAX_TTL_SECS: u64 = 86400 * 30;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_version: Option<u32>,
    /// 存储与总线的后端类型
    #[serde(default)]
    pub backend: BackendType,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub invalidation: InvalidationConfig,
    #[serde(default)]
    pub ttl: TtlConfig,
    #[serde(default)]
    pub serialization: SerializationConfig,
}

/// 后端类型枚举
///
/// `memory` 使用进程内存储和进程内广播，仅适用于单实例部署和测试
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    #[default]
    Redis,
    Memory,
}

/// Redis模式枚举
///
/// 定义支持的Redis部署模式
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// 单机模式
    #[default]
    Standalone,
    /// 哨兵模式
    Sentinel,
}

/// Redis 配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis模式
    pub mode: RedisMode,
    /// 连接字符串
    pub url: SecretString,
    /// Redis 密码（可选）
    pub password: Option<SecretString>,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 哨兵配置
    pub sentinel: Option<SentinelConfig>,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 每次 SCAN 往返处理的键数量
    pub scan_batch_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            url: SecretString::new("redis://127.0.0.1:6379".to_string().into()),
            password: None,
            enable_tls: false,
            sentinel: None,
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }
}

/// 哨兵配置
#[derive(Deserialize, Clone, Debug)]
pub struct SentinelConfig {
    /// 主节点名称
    pub master_name: String,
    /// 哨兵节点列表
    pub nodes: Vec<String>,
}

/// 失效频道配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct InvalidationConfig {
    /// 频道名称，所有协作进程必须一致
    pub channel: String,
    /// 是否在本进程内启动订阅者
    pub subscribe: bool,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_INVALIDATION_CHANNEL.to_string(),
            subscribe: true,
        }
    }
}

/// 各资源类型的缓存过期时间（秒）
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TtlConfig {
    /// 未单独配置时的默认值
    pub default: u64,
    pub song: u64,
    pub album: u64,
    pub artist: u64,
    pub search: u64,
    pub autocomplete: u64,
    pub top_songs: u64,
    pub home: u64,
    pub favorite: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            default: 300,
            song: 3600,
            album: 3600,
            artist: 3600,
            search: 3000,
            autocomplete: 3000,
            top_songs: 3600,
            home: 3600,
            favorite: 300,
        }
    }
}

impl TtlConfig {
    /// 获取资源类型对应的 TTL
    pub fn for_kind(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Song => self.song,
            ResourceKind::Album => self.album,
            ResourceKind::Artist => self.artist,
            ResourceKind::Search => self.search,
            ResourceKind::Autocomplete => self.autocomplete,
            ResourceKind::TopSongs => self.top_songs,
            ResourceKind::Home => self.home,
            ResourceKind::Favorite => self.favorite,
        }
    }

    fn entries(&self) -> [(&'static str, u64); 9] {
        [
            ("default", self.default),
            ("song", self.song),
            ("album", self.album),
            ("artist", self.artist),
            ("search", self.search),
            ("autocomplete", self.autocomplete),
            ("top_songs", self.top_songs),
            ("home", self.home),
            ("favorite", self.favorite),
        ]
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    /// JSON序列化
    #[default]
    Json,
}

/// 序列化配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct SerializationConfig {
    pub format: SerializationType,
    /// 是否对缓存值进行 gzip 压缩
    pub compress: bool,
}

impl Config {
    /// 从 TOML 字符串解析配置并验证
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(raw).map_err(|e| CacheError::ConfigError(e.to_string()))?;
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置并验证
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        for (name, ttl) in self.ttl.entries() {
            if ttl == 0 {
                return Err(format!("TTL '{}' cannot be zero", name));
            }
            if ttl > MAX_TTL_SECS {
                return Err(format!(
                    "TTL '{}' cannot exceed 30 days (2592000 seconds)",
                    name
                ));
            }
        }

        let channel = self.invalidation.channel.trim();
        if channel.is_empty() {
            return Err("Invalidation channel name cannot be empty".to_string());
        }
        if channel.contains(['*', '?', '[']) {
            return Err(format!(
                "Invalidation channel '{}' must not contain glob characters",
                channel
            ));
        }

        if self.backend == BackendType::Redis {
            let redis = &self.redis;
            if !(100..=30000).contains(&redis.connection_timeout_ms) {
                return Err("redis connection_timeout_ms must be between 100 and 30000 ms".to_string());
            }
            if !(100..=60000).contains(&redis.command_timeout_ms) {
                return Err("redis command_timeout_ms must be between 100 and 60000 ms".to_string());
            }
            if redis.scan_batch_size == 0 || redis.scan_batch_size > 10000 {
                return Err("redis scan_batch_size must be between 1 and 10000".to_string());
            }
            if redis.mode == RedisMode::Sentinel {
                match &redis.sentinel {
                    None => {
                        return Err("Sentinel mode requires a [redis.sentinel] section".to_string())
                    }
                    Some(sentinel) if sentinel.nodes.is_empty() => {
                        return Err("No sentinel nodes provided".to_string())
                    }
                    Some(sentinel) if sentinel.master_name.is_empty() => {
                        return Err("Sentinel master_name cannot be empty".to_string())
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }
}
