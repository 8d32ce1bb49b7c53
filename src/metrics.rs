//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的指标收集和监控功能。

use dashmap::DashMap;
use lazy_static::lazy_static;
use std::sync::Arc;

/// 指标收集器
///
/// 进程内计数器，按事件名累加
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 事件计数
    /// key: 事件名，例如 "read_hit"、"events_published"
    pub counters: Arc<DashMap<String, u64>>,
    /// 操作耗时
    /// key: 操作名 -> (total_duration_secs, count)
    pub operation_duration: Arc<DashMap<String, (f64, u64)>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 计数加一
    pub fn incr(&self, event: &str) {
        self.add(event, 1);
    }

    /// 计数增加 `n`
    pub fn add(&self, event: &str, n: u64) {
        *self.counters.entry(event.to_string()).or_insert(0) += n;
    }

    /// 读取计数
    pub fn get(&self, event: &str) -> u64 {
        self.counters.get(event).map(|v| *v).unwrap_or(0)
    }

    /// 记录操作耗时
    pub fn record_duration(&self, op: &str, duration_secs: f64) {
        let mut entry = self
            .operation_duration
            .entry(op.to_string())
            .or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }
}

/// 获取指标字符串
///
/// 以 Prometheus 文本格式输出所有指标，按名称排序
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;

    let mut counters: Vec<(String, u64)> = metrics
        .counters
        .iter()
        .map(|e| (e.key().clone(), *e.value()))
        .collect();
    counters.sort();

    let mut durations: Vec<(String, (f64, u64))> = metrics
        .operation_duration
        .iter()
        .map(|e| (e.key().clone(), *e.value()))
        .collect();
    durations.sort_by(|a, b| a.0.cmp(&b.0));

    let mut output = String::new();
    for (k, v) in counters {
        output.push_str(&format!("tunecache_events_total{{event=\"{}\"}} {}\n", k, v));
    }
    for (k, (total, count)) in durations {
        output.push_str(&format!(
            "tunecache_operation_duration_seconds_sum{{operation=\"{}\"}} {}\n",
            k, total
        ));
        output.push_str(&format!(
            "tunecache_operation_duration_seconds_count{{operation=\"{}\"}} {}\n",
            k, count
        ));
    }
    output
}
