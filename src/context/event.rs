//! 关联事件与观测协作方
//!
//! 拦截器核心只依赖两件事：根据入口名获取日志 `Span` 与事件记录器。
//! 事件如何渲染、投递由协作方决定，这里只提供空实现和基于 `tracing` 的默认实现。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

use chrono::{DateTime, Utc};
use tracing::Span;

/// 关联事件记录器
pub trait Event: Send + Sync + fmt::Debug {
    /// 设置计数器
    fn set_counter(&self, key: &str, value: i64);

    /// 添加键值对
    fn add_pair(&self, key: &str, value: &str);

    /// 记录错误
    fn add_error(&self, err: &str);

    /// 结束事件，`outcome` 为调用结果标签
    fn finish(&self, outcome: &str);

    /// 已记录的键值对
    fn pairs(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// 是否为空事件
    fn is_noop(&self) -> bool {
        false
    }
}

/// 空事件，忽略所有记录
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvent;

impl Event for NoopEvent {
    fn set_counter(&self, _key: &str, _value: i64) {}

    fn add_pair(&self, _key: &str, _value: &str) {}

    fn add_error(&self, _err: &str) {}

    fn finish(&self, _outcome: &str) {}

    fn is_noop(&self) -> bool {
        true
    }
}

static NOOP_EVENT: LazyLock<Arc<dyn Event>> = LazyLock::new(|| Arc::new(NoopEvent));

/// 进程级共享的空事件
pub fn noop_event() -> Arc<dyn Event> {
    NOOP_EVENT.clone()
}

#[derive(Debug, Default)]
struct EventState {
    pairs: BTreeMap<String, String>,
    counters: BTreeMap<String, i64>,
    errors: Vec<String>,
    finished: bool,
}

/// 基于 `tracing` 的事件：在内存中累积数据，结束时输出一条结构化日志
#[derive(Debug)]
pub struct TracingEvent {
    entry_name: String,
    started_at: DateTime<Utc>,
    state: Mutex<EventState>,
}

impl TracingEvent {
    pub fn new(entry_name: impl Into<String>) -> Self {
        Self {
            entry_name: entry_name.into(),
            started_at: Utc::now(),
            state: Mutex::new(EventState::default()),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EventState) -> R) -> R {
        // 锁中毒时继续使用内部数据
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl Event for TracingEvent {
    fn set_counter(&self, key: &str, value: i64) {
        self.with_state(|state| {
            state.counters.insert(key.to_string(), value);
        });
    }

    fn add_pair(&self, key: &str, value: &str) {
        self.with_state(|state| {
            state.pairs.insert(key.to_string(), value.to_string());
        });
    }

    fn add_error(&self, err: &str) {
        self.with_state(|state| state.errors.push(err.to_string()));
    }

    fn finish(&self, outcome: &str) {
        let payload = self.with_state(|state| {
            if state.finished {
                return None;
            }
            state.finished = true;
            Some(serde_json::json!({
                "pairs": state.pairs,
                "counters": state.counters,
                "errors": state.errors,
            }))
        });

        if let Some(payload) = payload {
            let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();
            tracing::info!(
                entry = %self.entry_name,
                outcome,
                elapsed_ms,
                payload = %payload,
                "rpc event finished"
            );
        }
    }

    fn pairs(&self) -> BTreeMap<String, String> {
        self.with_state(|state| state.pairs.clone())
    }
}

/// 观测协作方：根据入口名提供日志 `Span` 与事件记录器
pub trait EntryResolver: Send + Sync {
    fn logger(&self, entry_name: &str) -> Span;

    fn event(&self, entry_name: &str) -> Arc<dyn Event>;
}

/// 默认协作方，基于 `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingResolver;

impl EntryResolver for TracingResolver {
    fn logger(&self, entry_name: &str) -> Span {
        tracing::info_span!("grpc", entry = %entry_name)
    }

    fn event(&self, entry_name: &str) -> Arc<dyn Event> {
        Arc::new(TracingEvent::new(entry_name))
    }
}

/// 空协作方
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

impl EntryResolver for NoopResolver {
    fn logger(&self, _entry_name: &str) -> Span {
        Span::none()
    }

    fn event(&self, _entry_name: &str) -> Arc<dyn Event> {
        noop_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_event_records_nothing() {
        let event = noop_event();
        event.add_pair("k", "v");
        event.finish("ok");
        assert!(event.pairs().is_empty());
    }

    #[test]
    fn tracing_event_keeps_pairs() {
        let event = TracingEvent::new("ut-entry");
        event.add_pair("service", "pkg.Svc");
        event.add_pair("service", "pkg.Other");
        event.set_counter("retries", 2);
        event.add_error("boom");
        event.finish("error");
        // 重复 finish 不会再次输出
        event.finish("error");

        assert_eq!(event.pairs().get("service").map(String::as_str), Some("pkg.Other"));
    }

    #[test]
    fn resolvers_hand_out_values() {
        let event = TracingResolver.event("ut-entry");
        event.add_pair("k", "v");
        assert_eq!(event.pairs().len(), 1);

        assert!(NoopResolver.logger("ut-entry").is_none());
        assert!(NoopResolver.event("ut-entry").pairs().is_empty());
    }
}
