//! 上传事件
//!
//! 事件总线作用域为单个上传会话（不存在全局事件源）：
//! - 处理器按注册顺序同步调用
//! - 上传过程中可以随时注册或移除处理器
//! - 同一分片的事件有序：零个或多个 `ChunkError`，之后至多一个 `ChunkUpload`
//! - 不同分片之间的事件顺序不保证

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 上传事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 分片上传成功
    ChunkUpload {
        index: u32,
        offset: u64,
        size: u64,
        total_uploaded: u64,
    },
    /// 分片上传失败（单次尝试）
    ChunkError {
        index: u32,
        status_code: Option<u16>,
        message: String,
        /// 该分片的第几次失败
        attempt: u32,
    },
    /// 上传完成
    Done { remote_id: String },
}

impl UploadEvent {
    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            UploadEvent::ChunkUpload { .. } => "chunk_upload",
            UploadEvent::ChunkError { .. } => "chunk_error",
            UploadEvent::Done { .. } => "done",
        }
    }

    /// 关联的分片索引
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            UploadEvent::ChunkUpload { index, .. } => Some(*index),
            UploadEvent::ChunkError { index, .. } => Some(*index),
            UploadEvent::Done { .. } => None,
        }
    }
}

/// 事件处理器
pub type EventHandler = Arc<dyn Fn(&UploadEvent) + Send + Sync>;

/// 订阅 ID（用于移除处理器）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// 会话级事件总线
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<(SubscriptionId, EventHandler)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// 移除处理器
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    /// 处理器数量
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// 发布事件
    ///
    /// 先复制处理器列表再调用，处理器内部可以注册/移除处理器
    pub fn emit(&self, event: &UploadEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_emit_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let log = log.clone();
            bus.subscribe(move |e| log.lock().push(format!("{}:{}", name, e.event_type_name())));
        }

        bus.emit(&UploadEvent::Done {
            remote_id: "id".to_string(),
        });
        assert_eq!(*log.lock(), vec!["a:done", "b:done", "c:done"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let id = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let event = UploadEvent::Done {
            remote_id: "x".to_string(),
        };
        bus.emit(&event);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&event);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_inside_handler() {
        let bus = Arc::new(EventBus::new());
        let inner_bus = bus.clone();
        bus.subscribe(move |_| {
            inner_bus.subscribe(|_| {});
        });

        bus.emit(&UploadEvent::Done {
            remote_id: "x".to_string(),
        });
        assert_eq!(bus.handler_count(), 2);
    }

    #[test]
    fn test_event_serialization() {
        let event = UploadEvent::ChunkUpload {
            index: 1,
            offset: 25_000_000,
            size: 25_000_000,
            total_uploaded: 50_000_000,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"chunk_upload\""));
        assert_eq!(event.chunk_index(), Some(1));
    }
}
