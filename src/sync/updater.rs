//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了写路径的缓存更新入口：先广播失效，再按需回填热点键。

use super::event::{ChangeAction, InvalidationEvent};
use super::invalidation::{InvalidationPublisher, ResourceChange};
use super::policy::{ResourceInvalidationPolicy, ResourceKind};
use crate::backend::CacheStore;
use crate::config::TtlConfig;
use crate::error::Result;
use crate::keys::CacheKey;
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::{Serializer, SerializerEnum};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// 一次更新的结果
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// 构建出的失效消息（发布失败时也会返回）
    pub event: InvalidationEvent,
    pub published: bool,
    /// 成功回填的键
    pub repopulated: Vec<CacheKey>,
}

/// 缓存资源更新器
///
/// 每次持久化变更之后调用；发布失败不会回滚已提交的变更
#[derive(Clone)]
pub struct CacheResourceUpdater {
    publisher: InvalidationPublisher,
    store: Arc<dyn CacheStore>,
    serializer: SerializerEnum,
    ttl: TtlConfig,
    policy: ResourceInvalidationPolicy,
}

impl CacheResourceUpdater {
    pub fn new(
        publisher: InvalidationPublisher,
        store: Arc<dyn CacheStore>,
        serializer: SerializerEnum,
        ttl: TtlConfig,
        policy: ResourceInvalidationPolicy,
    ) -> Self {
        Self {
            publisher,
            store,
            serializer,
            ttl,
            policy,
        }
    }

    /// 更新资源
    ///
    /// 没有新值时只广播 `update`。有新值时广播 `refresh`，消息中不包含
    /// 即将回填的键，然后以该类型的 TTL 写入这些键。
    #[instrument(skip(self, viewers, value), level = "debug", fields(kind = %kind, viewers = viewers.len()))]
    pub async fn update_resource<T: Serialize + Sync>(
        &self,
        kind: ResourceKind,
        id: Option<&str>,
        viewers: &[String],
        value: Option<&T>,
    ) -> Result<UpdateOutcome> {
        let payload = match value.map(|v| self.serializer.serialize(v)) {
            Some(Ok(bytes)) => Some(bytes),
            Some(Err(e)) => {
                warn!("CacheResourceUpdater: cannot serialize new value for {}: {}", kind, e);
                None
            }
            None => None,
        };

        let targets = match payload {
            Some(_) => self.policy.repopulate_keys(kind, id),
            None => Vec::new(),
        };
        let action = if targets.is_empty() {
            ChangeAction::Update
        } else {
            ChangeAction::Refresh
        };
        let change = ResourceChange::new(kind)
            .id(id)
            .viewers(viewers)
            .action(action)
            .retain(targets.clone());

        let (event, published) = self.publish(change).await;

        let mut repopulated = Vec::with_capacity(targets.len());
        if let Some(bytes) = payload {
            let ttl = self.ttl.for_kind(kind);
            for key in targets {
                match self.store.set(key.as_str(), bytes.clone(), ttl).await {
                    Ok(()) => repopulated.push(key),
                    Err(e) => {
                        GLOBAL_METRICS.incr("cache_write_failures");
                        warn!("CacheResourceUpdater: repopulate {} failed: {}", key, e);
                    }
                }
            }
        }

        debug!(
            "CacheResourceUpdater: {} published={} repopulated={}",
            event.event_type,
            published,
            repopulated.len()
        );
        Ok(UpdateOutcome {
            event,
            published,
            repopulated,
        })
    }

    /// 只广播失效，不回填
    pub async fn invalidate(
        &self,
        kind: ResourceKind,
        id: Option<&str>,
        viewers: &[String],
    ) -> Result<UpdateOutcome> {
        self.update_resource::<()>(kind, id, viewers, None).await
    }

    /// 资源被删除
    pub async fn delete_resource(
        &self,
        kind: ResourceKind,
        id: Option<&str>,
        viewers: &[String],
    ) -> Result<UpdateOutcome> {
        let change = ResourceChange::new(kind)
            .id(id)
            .viewers(viewers)
            .action(ChangeAction::Delete);
        let (event, published) = self.publish(change).await;
        Ok(UpdateOutcome {
            event,
            published,
            repopulated: Vec::new(),
        })
    }

    /// 按名称更新资源，未知类型返回 `CacheError::UnsupportedResource`
    pub async fn update_named<T: Serialize + Sync>(
        &self,
        kind: &str,
        id: Option<&str>,
        viewers: &[String],
        value: Option<&T>,
    ) -> Result<UpdateOutcome> {
        let kind: ResourceKind = kind.parse()?;
        self.update_resource(kind, id, viewers, value).await
    }

    async fn publish(&self, change: ResourceChange) -> (InvalidationEvent, bool) {
        match self.publisher.publish_change(change.clone()).await {
            Ok(event) => (event, true),
            Err(e) => {
                warn!("CacheResourceUpdater: publish for {} failed: {}", change.kind, e);
                (self.publisher.build_event(&change), false)
            }
        }
    }
}
