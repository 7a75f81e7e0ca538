//! 上下线事件发布器。
//!
//! 只由注册表在存储确认真实迁移后调用；自身不做去重。

use crate::population::PopulationResolver;
use crate::{EventBus, EventError, HubEvent, HubNotice};
use domain::{ChangedAttributes, hub_address};
use fleet_telemetry::{record_event_failure, record_event_published};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EventEmitter {
    bus: Arc<dyn EventBus>,
    populations: Arc<dyn PopulationResolver>,
}

impl EventEmitter {
    pub fn new(bus: Arc<dyn EventBus>, populations: Arc<dyn PopulationResolver>) -> Self {
        Self { bus, populations }
    }

    /// 广播上线（属性变更）事件。
    pub async fn emit_connected(
        &self,
        hub_id: &str,
        place_id: Option<&str>,
        changes: ChangedAttributes,
    ) -> Result<(), EventError> {
        let event = HubEvent::Connected(self.notice(hub_id, place_id, changes));
        self.publish(event).await
    }

    /// 广播离线事件。
    pub async fn emit_disconnected(
        &self,
        hub_id: &str,
        place_id: Option<&str>,
        changes: ChangedAttributes,
    ) -> Result<(), EventError> {
        let event = HubEvent::Disconnected(self.notice(hub_id, place_id, changes));
        self.publish(event).await
    }

    fn notice(&self, hub_id: &str, place_id: Option<&str>, changes: ChangedAttributes) -> HubNotice {
        HubNotice {
            device_address: hub_address(hub_id),
            hub_id: hub_id.to_string(),
            place_id: place_id.map(str::to_string),
            population: self.populations.population_for(place_id),
            changes,
        }
    }

    async fn publish(&self, event: HubEvent) -> Result<(), EventError> {
        let kind = event.kind();
        let hub_id = event.notice().hub_id.clone();
        match self.bus.publish(event).await {
            Ok(()) => {
                record_event_published();
                debug!(target: "fleet.events", hub_id = %hub_id, kind, "hub_event_published");
                Ok(())
            }
            Err(err) => {
                record_event_failure();
                warn!(
                    target: "fleet.events",
                    hub_id = %hub_id,
                    kind,
                    error = %err,
                    "hub_event_publish_failed"
                );
                Err(err)
            }
        }
    }
}
