//! 信号接入装配：把 MQTT（或空操作）信号源接到在线注册表。

use async_trait::async_trait;
use domain::PartitionId;
use fleet_config::AppConfig;
use fleet_ingress::{
    IngressError, MqttSignalSource, MqttSignalSourceConfig, NoopSource, SignalHandler,
    SignalSource,
};
use fleet_registry::LivenessRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 注册表信号处理器：注册表自行记录对账失败，这里总是成功。
pub struct RegistrySignalHandler {
    registry: Arc<LivenessRegistry>,
}

impl RegistrySignalHandler {
    pub fn new(registry: Arc<LivenessRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl SignalHandler for RegistrySignalHandler {
    async fn on_heartbeat(
        &self,
        hub_id: &str,
        partition_id: PartitionId,
        source_id: &str,
    ) -> Result<(), IngressError> {
        self.registry
            .record_heartbeat(hub_id, partition_id, source_id)
            .await;
        Ok(())
    }

    async fn on_absence(&self, hub_id: &str, source_id: &str) -> Result<(), IngressError> {
        self.registry.record_absence(hub_id, source_id).await;
        Ok(())
    }
}

/// 启动信号接入任务。
pub fn spawn_ingress(
    config: &AppConfig,
    registry: Arc<LivenessRegistry>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let source: Arc<dyn SignalSource> = if config.ingress_enabled {
        let mqtt_config = MqttSignalSourceConfig {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            username: config.mqtt_username.clone(),
            password: config.mqtt_password.clone(),
            topic_prefix: config.mqtt_signal_topic_prefix.clone(),
        };
        info!(
            target: "fleet.ingress",
            host = %mqtt_config.host,
            port = mqtt_config.port,
            prefix = %mqtt_config.topic_prefix,
            "ingress_source_mqtt"
        );
        Arc::new(MqttSignalSource::new(mqtt_config))
    } else {
        info!(target: "fleet.ingress", "ingress_source_noop");
        Arc::new(NoopSource)
    };
    let handler = Arc::new(RegistrySignalHandler::new(registry));

    tokio::spawn(async move {
        if let Err(err) = source.run(handler, cancel).await {
            warn!(target: "fleet.ingress", error = %err, "ingress_stopped");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{HubRecord, HubSignal, HubState};
    use fleet_events::{EventEmitter, InMemoryEventBus, StaticPopulationResolver};
    use fleet_ingress::ChannelSignalSource;
    use fleet_registry::ManualClock;
    use fleet_storage::InMemoryLivenessStore;
    use std::time::Duration;

    #[tokio::test]
    async fn channel_signals_drive_registry() {
        let store = Arc::new(InMemoryLivenessStore::with_hubs([HubRecord::new(
            "HUB-0001",
            Some("place-1".to_string()),
            5,
            HubState::Offline,
        )]));
        let bus = Arc::new(InMemoryEventBus::new());
        let registry = Arc::new(LivenessRegistry::new(
            store.clone(),
            EventEmitter::new(bus.clone(), Arc::new(StaticPopulationResolver::new())),
            Arc::new(ManualClock::new(1_000)),
            Duration::from_secs(600),
        ));
        let (tx, source) = ChannelSignalSource::new(8);
        let handler = Arc::new(RegistrySignalHandler::new(Arc::clone(&registry)));

        tx.send(HubSignal::Heartbeat {
            hub_id: "HUB-0001".to_string(),
            partition_id: 5,
            source_id: "bridge-a".to_string(),
        })
        .await
        .unwrap();
        tx.send(HubSignal::Absence {
            hub_id: "HUB-0001".to_string(),
            source_id: "bridge-a".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        source.run(handler, CancellationToken::new()).await.unwrap();

        assert!(!registry.is_online("HUB-0001"));
        let kinds: Vec<&str> = bus.events().iter().map(|event| event.kind()).collect();
        assert_eq!(kinds, vec!["connected", "disconnected"]);
        assert_eq!(store.state_of("HUB-0001"), Some(HubState::Offline));
    }
}
