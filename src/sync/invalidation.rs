//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存失效机制，用于处理跨实例的缓存失效。

use super::bus::InvalidationBus;
use super::event::{ChangeAction, EventType, InvalidationEvent};
use super::policy::{ResourceInvalidationPolicy, ResourceKind};
use crate::backend::{sweep, CacheStore};
use crate::error::Result;
use crate::keys::CacheKey;
use crate::metrics::GLOBAL_METRICS;
use chrono::Utc;
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// 一次资源变更
///
/// 默认动作为 `update`，没有保留键
#[derive(Debug, Clone)]
pub struct ResourceChange {
    pub kind: ResourceKind,
    pub id: Option<String>,
    pub viewers: Vec<String>,
    pub pattern: Option<String>,
    pub action: ChangeAction,
    /// 不写入消息的键（发布者自己会回填）
    pub retain: Vec<CacheKey>,
}

impl ResourceChange {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            id: None,
            viewers: Vec::new(),
            pattern: None,
            action: ChangeAction::Update,
            retain: Vec::new(),
        }
    }

    pub fn id(mut self, id: Option<&str>) -> Self {
        self.id = id.map(str::to_string);
        self
    }

    pub fn viewers(mut self, viewers: &[String]) -> Self {
        self.viewers = viewers.to_vec();
        self
    }

    pub fn pattern(mut self, pattern: Option<&str>) -> Self {
        self.pattern = pattern.map(str::to_string);
        self
    }

    pub fn action(mut self, action: ChangeAction) -> Self {
        self.action = action;
        self
    }

    pub fn retain(mut self, keys: Vec<CacheKey>) -> Self {
        self.retain = keys;
        self
    }
}

/// 缓存失效发布者
///
/// 只负责构建并广播消息，从不直接修改缓存
#[derive(Clone)]
pub struct InvalidationPublisher {
    bus: Arc<dyn InvalidationBus>,
    policy: ResourceInvalidationPolicy,
    /// 本进程的实例ID
    origin: String,
}

impl InvalidationPublisher {
    pub fn new(bus: Arc<dyn InvalidationBus>, policy: ResourceInvalidationPolicy) -> Self {
        Self {
            bus,
            policy,
            origin: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// 按策略表构建消息，不发布
    pub fn build_event(&self, change: &ResourceChange) -> InvalidationEvent {
        let plan = self.policy.plan(
            change.kind,
            change.id.as_deref(),
            &change.viewers,
            change.pattern.as_deref(),
        );

        let mut event = InvalidationEvent::new(EventType::new(change.kind, change.action));
        event.keys = plan
            .keys
            .into_iter()
            .filter(|key| !change.retain.contains(key))
            .collect();
        event.resource_id = change.id.clone();
        event.viewer_ids = change.viewers.clone();
        event.pattern = plan.pattern;
        event.origin = Some(self.origin.clone());
        event.published_at = Some(Utc::now());
        event
    }

    /// 发布一次资源变更
    #[instrument(skip(self, change), level = "debug", fields(kind = %change.kind, action = change.action.as_str()))]
    pub async fn publish_change(&self, change: ResourceChange) -> Result<InvalidationEvent> {
        let event = self.build_event(&change);
        match self.bus.publish(&event).await {
            Ok(()) => {
                GLOBAL_METRICS.incr("events_published");
                debug!(
                    "InvalidationPublisher: published {} with {} keys",
                    event.event_type,
                    event.keys.len()
                );
                Ok(event)
            }
            Err(e) => {
                GLOBAL_METRICS.incr("events_publish_failed");
                Err(e)
            }
        }
    }

    /// 发布资源更新消息
    pub async fn publish_resource_change(
        &self,
        kind: ResourceKind,
        id: Option<&str>,
        viewers: &[String],
        explicit_pattern: Option<&str>,
    ) -> Result<InvalidationEvent> {
        self.publish_change(
            ResourceChange::new(kind)
                .id(id)
                .viewers(viewers)
                .pattern(explicit_pattern),
        )
        .await
    }

    /// 按名称发布资源更新消息
    ///
    /// 未知的资源类型在发布前就返回 `CacheError::UnsupportedResource`
    pub async fn publish_named(
        &self,
        kind: &str,
        id: Option<&str>,
        viewers: &[String],
        explicit_pattern: Option<&str>,
    ) -> Result<InvalidationEvent> {
        let kind: ResourceKind = kind.parse()?;
        self.publish_resource_change(kind, id, viewers, explicit_pattern)
            .await
    }
}

/// 单条消息的处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub keys_deleted: u64,
    pub canonical_deleted: bool,
    pub swept: u64,
    pub failures: u64,
}

/// 缓存失效订阅者
///
/// 每个进程只有一个，在后台任务中按接收顺序逐条处理消息
#[derive(Clone)]
pub struct InvalidationSubscriber {
    store: Arc<dyn CacheStore>,
    policy: ResourceInvalidationPolicy,
}

impl InvalidationSubscriber {
    pub fn new(store: Arc<dyn CacheStore>, policy: ResourceInvalidationPolicy) -> Self {
        Self { store, policy }
    }

    /// 启动订阅者
    ///
    /// 订阅成功后才返回；消息在后台任务中处理，直到句柄被关闭
    #[instrument(skip(self, bus), level = "info", fields(channel = bus.channel()))]
    pub async fn start(self, bus: &dyn InvalidationBus) -> Result<SubscriberHandle> {
        let mut payloads = bus.subscribe().await?;
        let cancel = CancellationToken::new();
        let (processed_tx, processed_rx) = watch::channel(0u64);

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = payloads.next() => match next {
                        Some(payload) => {
                            self.handle_payload(&payload).await;
                            processed_tx.send_modify(|count| *count += 1);
                        }
                        None => break,
                    },
                }
            }
            debug!("InvalidationSubscriber: stopped");
        });

        info!("InvalidationSubscriber: started");
        Ok(SubscriberHandle {
            cancel,
            task: Mutex::new(Some(task)),
            processed: processed_rx,
        })
    }

    /// 处理一条原始消息，格式错误的消息记录日志后丢弃
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<InvalidationReport> {
        GLOBAL_METRICS.incr("events_received");
        match InvalidationEvent::decode(payload) {
            Ok(event) => Some(self.apply(&event).await),
            Err(e) => {
                GLOBAL_METRICS.incr("events_dropped");
                warn!("InvalidationSubscriber: dropping message: {}", e);
                None
            }
        }
    }

    /// 执行一条消息要求的删除
    ///
    /// 任何一步失败都只记录日志，不影响其余删除
    #[instrument(skip(self, event), level = "debug", fields(event_type = %event.event_type))]
    pub async fn apply(&self, event: &InvalidationEvent) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        if !event.keys.is_empty() {
            match self.store.delete_many(&event.keys).await {
                Ok(deleted) => report.keys_deleted = deleted,
                Err(e) => {
                    warn!("InvalidationSubscriber: bulk delete failed, retrying per key: {}", e);
                    for key in &event.keys {
                        if let Err(e) = self.store.delete(key.as_str()).await {
                            warn!("InvalidationSubscriber: delete {} failed: {}", key, e);
                            report.failures += 1;
                        }
                    }
                }
            }
        }

        if matches!(event.action(), ChangeAction::Update | ChangeAction::Delete) {
            let canonical = event
                .resource_id
                .as_deref()
                .and_then(|id| self.policy.canonical_key(event.kind(), id));
            if let Some(key) = canonical {
                match self.store.delete(key.as_str()).await {
                    Ok(()) => report.canonical_deleted = true,
                    Err(e) => {
                        warn!("InvalidationSubscriber: delete {} failed: {}", key, e);
                        report.failures += 1;
                    }
                }
            }
        }

        if let Some(pattern) = &event.pattern {
            let swept = sweep(self.store.as_ref(), pattern).await;
            report.swept = swept.deleted;
            report.failures += swept.failed_batches;
            if swept.interrupted {
                report.failures += 1;
            }
        }

        GLOBAL_METRICS.add("keys_invalidated", report.keys_deleted);
        debug!(
            "InvalidationSubscriber: {} cleared keys={}, swept={}, failures={}",
            event.event_type, report.keys_deleted, report.swept, report.failures
        );
        report
    }
}

/// 订阅者后台任务的句柄
pub struct SubscriberHandle {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    processed: watch::Receiver<u64>,
}

impl SubscriberHandle {
    /// 已处理的消息数量（包括被丢弃的格式错误消息）
    pub fn processed(&self) -> u64 {
        *self.processed.borrow()
    }

    /// 等待处理的消息数量达到 `count`
    pub async fn wait_for(&self, count: u64) {
        let mut processed = self.processed.clone();
        // 发送端关闭说明任务已退出，不会再有进展
        let _ = processed.wait_for(|n| *n >= count).await;
    }

    /// 停止后台任务并等待其退出
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("InvalidationSubscriber: task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
