use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// 面向用户的一条事件（上传进度、失败详情等）
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: DateTime<Local>,
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Default)]
struct Registry {
    next_subscriber: u64,
    next_entry: u64,
    closed: bool,
    subscribers: HashMap<u64, mpsc::UnboundedSender<LogEntry>>,
}

/// 事件总线：多个订阅者各自持有一个无界通道
///
/// 克隆共享同一个注册表。订阅在 `Subscription` 被丢弃时自动注销。
#[derive(Clone, Default)]
pub struct LogBus {
    inner: Arc<Mutex<Registry>>,
}

impl LogBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut reg = self.lock();
        let id = reg.next_subscriber;
        reg.next_subscriber += 1;
        if !reg.closed {
            reg.subscribers.insert(id, tx);
        }
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// 广播一条事件并同步写入日志；已关闭的订阅者顺带清理
    pub fn publish(&self, level: LogLevel, message: impl Into<String>, details: Option<Value>) -> LogEntry {
        let message = message.into();
        match level {
            LogLevel::Info => log::info!("{}", message),
            LogLevel::Warning => log::warn!("{}", message),
            LogLevel::Error => match &details {
                Some(d) => log::error!("{} {}", message, d),
                None => log::error!("{}", message),
            },
        }

        let mut reg = self.lock();
        reg.next_entry += 1;
        let entry = LogEntry {
            id: reg.next_entry,
            timestamp: Local::now(),
            level,
            message,
            details,
        };
        reg.subscribers
            .retain(|_, tx| tx.send(entry.clone()).is_ok());
        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.publish(LogLevel::Info, message, None)
    }

    pub fn warning(&self, message: impl Into<String>) -> LogEntry {
        self.publish(LogLevel::Warning, message, None)
    }

    pub fn error(&self, message: impl Into<String>, details: Option<Value>) -> LogEntry {
        self.publish(LogLevel::Error, message, details)
    }

    /// 关闭总线：现有订阅者收完缓冲后 `recv` 返回 None，之后的订阅不再接收
    pub fn close(&self) {
        let mut reg = self.lock();
        reg.closed = true;
        reg.subscribers.clear();
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<LogEntry>,
    bus: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.rx.recv().await
    }

    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<LogEntry> {
        self.rx.try_recv().ok()
    }

    /// 取出当前已缓冲的全部事件
    #[cfg(test)]
    pub fn drain(&mut self) -> Vec<LogEntry> {
        let mut out = Vec::new();
        while let Ok(entry) = self.rx.try_recv() {
            out.push(entry);
        }
        out
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut reg = inner.lock().unwrap_or_else(|e| e.into_inner());
            reg.subscribers.remove(&self.id);
        }
    }
}
