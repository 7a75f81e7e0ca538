//! Hub 上下线事件：事件模型、总线抽象与发布器。

pub mod emitter;
pub mod mqtt;
pub mod population;

pub use emitter::EventEmitter;
pub use mqtt::{MqttEventBus, MqttEventBusConfig};
pub use population::{PopulationResolver, StaticPopulationResolver};

use async_trait::async_trait;
use domain::{ChangedAttributes, Population};
use std::sync::Mutex;

/// 事件发布错误。
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("publish error: {0}")]
    Publish(String),
    #[error("encode error: {0}")]
    Encode(String),
}

/// 单条上下线通知的公共字段。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubNotice {
    /// 事件来源地址（`SERV:hub:<hub_id>`）。
    pub device_address: String,
    pub hub_id: String,
    pub place_id: Option<String>,
    pub population: Population,
    /// 存储侧实际改变的属性。
    pub changes: ChangedAttributes,
}

/// 对外广播的 Hub 事件，按 place 作用域。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Connected(HubNotice),
    Disconnected(HubNotice),
}

impl HubEvent {
    pub fn notice(&self) -> &HubNotice {
        match self {
            HubEvent::Connected(notice) | HubEvent::Disconnected(notice) => notice,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HubEvent::Connected(_) => "connected",
            HubEvent::Disconnected(_) => "disconnected",
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, HubEvent::Disconnected(_))
    }
}

/// 事件总线抽象（fire-and-forget 广播）。
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: HubEvent) -> Result<(), EventError>;
}

/// 内存总线：按顺序保存已发布事件，用于测试与本地演示。
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    events: Mutex<Vec<HubEvent>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发布事件的副本。
    pub fn events(&self) -> Vec<HubEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// 取出并清空已发布事件。
    pub fn take(&self) -> Vec<HubEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: HubEvent) -> Result<(), EventError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| EventError::Publish("lock failed".to_string()))?;
        events.push(event);
        Ok(())
    }
}
