//! MQTT 事件总线实现（发布 JSON 事件）。

use crate::{EventBus, EventError, HubEvent};
use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// MQTT 事件总线配置。
#[derive(Debug, Clone)]
pub struct MqttEventBusConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 事件 topic：`{prefix}/{place_id|none}/{connected|disconnected}/{hub_id}`
    pub topic_prefix: String,
    pub qos: u8,
}

#[derive(Clone)]
pub struct MqttEventBus {
    client: AsyncClient,
    topic_prefix: String,
    qos: QoS,
}

impl MqttEventBus {
    pub fn connect(
        config: MqttEventBusConfig,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), EventError> {
        let client_id = format!("fleet-events-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "fleet.events", "mqtt event eventloop error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        Ok((
            Self {
                client,
                topic_prefix: config.topic_prefix,
                qos: qos_from_u8(config.qos),
            },
            handle,
        ))
    }

    fn topic_for(&self, event: &HubEvent) -> String {
        let notice = event.notice();
        let prefix = self.topic_prefix.trim_end_matches('/');
        let place = notice.place_id.as_deref().unwrap_or("none");
        format!("{}/{}/{}/{}", prefix, place, event.kind(), notice.hub_id)
    }
}

#[async_trait]
impl EventBus for MqttEventBus {
    async fn publish(&self, event: HubEvent) -> Result<(), EventError> {
        let topic = self.topic_for(&event);
        let payload = event_payload(&event)?;
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|err| EventError::Publish(err.to_string()))
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct HubEventEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    source: &'a str,
    hub_id: &'a str,
    place_id: Option<&'a str>,
    population: &'a str,
    attributes: BTreeMap<&'a str, &'a str>,
}

fn event_payload(event: &HubEvent) -> Result<Vec<u8>, EventError> {
    let notice = event.notice();
    let envelope = HubEventEnvelope {
        kind: event.kind(),
        source: &notice.device_address,
        hub_id: &notice.hub_id,
        place_id: notice.place_id.as_deref(),
        population: notice.population.as_str(),
        attributes: notice.changes.iter().collect(),
    };
    serde_json::to_vec(&envelope).map_err(|err| EventError::Encode(err.to_string()))
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
