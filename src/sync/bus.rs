//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效消息总线：进程间共享的单一广播频道。
//!
//! 投递语义为"至少一次、仅限在线订阅者"，离线期间的消息直接丢失，
//! 由 TTL 兜底。

use super::event::InvalidationEvent;
use crate::backend::redis_provider::RedisConnection;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, instrument, warn};

/// 订阅断开后的重连间隔
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// 原始消息流，按接收顺序产出
pub type PayloadStream = BoxStream<'static, Vec<u8>>;

/// 失效消息总线
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    /// 频道名称
    fn channel(&self) -> &str;

    /// 广播一条已编码的消息
    async fn publish_raw(&self, payload: Vec<u8>) -> Result<()>;

    /// 编码并广播失效消息
    async fn publish(&self, event: &InvalidationEvent) -> Result<()> {
        let payload = event.encode()?;
        self.publish_raw(payload).await
    }

    /// 订阅频道
    ///
    /// 每个总线句柄只能订阅一次，重复订阅返回 `CacheError::AlreadySubscribed`
    async fn subscribe(&self) -> Result<PayloadStream>;
}

fn claim_subscription(flag: &AtomicBool, channel: &str) -> Result<()> {
    if flag.swap(true, Ordering::SeqCst) {
        return Err(CacheError::AlreadySubscribed(channel.to_string()));
    }
    Ok(())
}

/// 基于 Redis PUBLISH/SUBSCRIBE 的总线
pub struct RedisBus {
    client: Client,
    manager: ConnectionManager,
    channel: String,
    command_timeout: Duration,
    subscribed: AtomicBool,
}

async fn open_subscription(client: &Client, channel: &str) -> Result<PayloadStream> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    Ok(pubsub
        .into_on_message()
        .map(|msg| msg.get_payload_bytes().to_vec())
        .boxed())
}

impl RedisBus {
    pub fn new(connection: &RedisConnection, channel: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            client: connection.client.clone(),
            manager: connection.manager.clone(),
            channel: channel.into(),
            command_timeout,
            subscribed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl InvalidationBus for RedisBus {
    fn channel(&self) -> &str {
        &self.channel
    }

    #[instrument(skip(self, payload), level = "debug", fields(channel = %self.channel, len = payload.len()))]
    async fn publish_raw(&self, payload: Vec<u8>) -> Result<()> {
        let mut conn = self.manager.clone();
        let receivers: i64 = timeout(
            self.command_timeout,
            redis::cmd("PUBLISH")
                .arg(&self.channel)
                .arg(payload)
                .query_async(&mut conn),
        )
        .await??;
        debug!("RedisBus: message delivered to {} subscribers", receivers);
        Ok(())
    }

    #[instrument(skip(self), level = "info", fields(channel = %self.channel))]
    async fn subscribe(&self) -> Result<PayloadStream> {
        claim_subscription(&self.subscribed, &self.channel)?;

        let initial = match open_subscription(&self.client, &self.channel).await {
            Ok(stream) => stream,
            Err(e) => {
                self.subscribed.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        info!("RedisBus: subscribed to {}", self.channel);

        let state = (Some(initial), self.client.clone(), self.channel.clone());
        let payloads = stream::unfold(state, |(mut current, client, channel)| async move {
            loop {
                if let Some(messages) = current.as_mut() {
                    match messages.next().await {
                        Some(payload) => return Some((payload, (current, client, channel))),
                        None => {
                            warn!("RedisBus: subscription to {} dropped, reconnecting", channel);
                            current = None;
                        }
                    }
                }

                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                match open_subscription(&client, &channel).await {
                    Ok(stream) => {
                        info!("RedisBus: resubscribed to {}", channel);
                        current = Some(stream);
                    }
                    Err(e) => warn!("RedisBus: resubscribe to {} failed: {}", channel, e),
                }
            }
        });

        Ok(payloads.boxed())
    }
}

/// 进程内总线
///
/// 通过 [`LocalBus::connect`] 得到的句柄共享同一份订阅者列表，
/// 每个句柄各自只能订阅一次，可用来模拟多个进程。
/// 每个订阅者拥有独立的无界队列，订阅存活期间不会丢弃消息。
pub struct LocalBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
    channel: Arc<str>,
    subscribed: AtomicBool,
}

impl LocalBus {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            channel: Arc::from(channel.into()),
            subscribed: AtomicBool::new(false),
        }
    }

    /// 连接到同一个频道的新句柄
    pub fn connect(&self) -> LocalBus {
        Self {
            subscribers: self.subscribers.clone(),
            channel: self.channel.clone(),
            subscribed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl InvalidationBus for LocalBus {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn publish_raw(&self, payload: Vec<u8>) -> Result<()> {
        let mut subscribers = self.subscribers.lock().await;
        // 订阅流被丢弃后发送失败，顺便移除
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        if subscribers.is_empty() {
            debug!("LocalBus: no subscribers on {}", self.channel);
        } else {
            debug!("LocalBus: message delivered to {} subscribers", subscribers.len());
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<PayloadStream> {
        claim_subscription(&self.subscribed, &self.channel)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(tx);

        let payloads = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        });
        Ok(payloads.boxed())
    }
}
