//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的同步机制，包括失效策略、消息总线、失效的发布与订阅以及写路径回填。

pub mod bus;
pub mod event;
pub mod invalidation;
pub mod policy;
pub mod updater;

pub use bus::{InvalidationBus, LocalBus, RedisBus};
pub use event::{ChangeAction, EventType, InvalidationEvent};
pub use invalidation::{
    InvalidationPublisher, InvalidationReport, InvalidationSubscriber, ResourceChange,
    SubscriberHandle,
};
pub use policy::{InvalidationPlan, InvalidationRule, ResourceInvalidationPolicy, ResourceKind};
pub use updater::{CacheResourceUpdater, UpdateOutcome};
