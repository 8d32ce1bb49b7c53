//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效消息的线上格式。
//!
//! 消息是 camelCase 的 JSON 对象：
//! `{"type":"song:update","keys":[...],"resourceId":"S","userIds":["U1"],"pattern":"songs:list:*"}`

use super::policy::ResourceKind;
use crate::error::{CacheError, Result};
use crate::keys::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 变更动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    Update,
    Delete,
    /// 发布者已经写入了新值，订阅端不再点删元数据键
    Refresh,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
            ChangeAction::Refresh => "refresh",
        }
    }
}

impl FromStr for ChangeAction {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "update" => Ok(ChangeAction::Update),
            "delete" => Ok(ChangeAction::Delete),
            "refresh" => Ok(ChangeAction::Refresh),
            other => Err(CacheError::MalformedEvent(format!(
                "unknown action '{}'",
                other
            ))),
        }
    }
}

/// 消息类型 `<kind>:<action>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType {
    pub kind: ResourceKind,
    pub action: ChangeAction,
}

impl EventType {
    pub fn new(kind: ResourceKind, action: ChangeAction) -> Self {
        Self { kind, action }
    }

    pub fn update(kind: ResourceKind) -> Self {
        Self::new(kind, ChangeAction::Update)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.action.as_str())
    }
}

impl FromStr for EventType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, action) = s
            .split_once(':')
            .ok_or_else(|| CacheError::MalformedEvent(format!("invalid event type '{}'", s)))?;
        let kind = kind
            .parse::<ResourceKind>()
            .map_err(|e| CacheError::MalformedEvent(e.to_string()))?;
        Ok(Self::new(kind, action.parse()?))
    }
}

impl TryFrom<String> for EventType {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.to_string()
    }
}

/// 失效消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// 需要直接删除的键
    #[serde(default)]
    pub keys: Vec<CacheKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(rename = "userIds", default)]
    pub viewer_ids: Vec<String>,
    /// 需要清扫的 glob 模式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// 发布进程的实例ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl InvalidationEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            keys: Vec::new(),
            resource_id: None,
            viewer_ids: Vec::new(),
            pattern: None,
            origin: None,
            published_at: None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.event_type.kind
    }

    pub fn action(&self) -> ChangeAction {
        self.event_type.action
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| CacheError::MalformedEvent(e.to_string()))
    }
}
