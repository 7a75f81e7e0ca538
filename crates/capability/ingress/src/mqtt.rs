//! MQTT 信号源。
//!
//! topic 约定（payload 忽略）：
//! - `{prefix}/online/{partition}/{hub_id}/{source_id}`
//! - `{prefix}/offline/{hub_id}/{source_id}`

use crate::{IngressError, SignalHandler, SignalSource, dispatch};
use async_trait::async_trait;
use domain::HubSignal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 轮询失败后的重连间隔。
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// MQTT 信号源配置。
#[derive(Debug, Clone)]
pub struct MqttSignalSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
}

#[derive(Debug, Clone)]
pub struct MqttSignalSource {
    config: MqttSignalSourceConfig,
}

impl MqttSignalSource {
    pub fn new(config: MqttSignalSourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MqttSignalSourceConfig {
        &self.config
    }
}

#[async_trait]
impl SignalSource for MqttSignalSource {
    async fn run(
        &self,
        handler: Arc<dyn SignalHandler>,
        cancel: CancellationToken,
    ) -> Result<(), IngressError> {
        let client_id = format!("fleet-ingress-{}", uuid::Uuid::new_v4());
        let mut options =
            rumqttc::MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = rumqttc::AsyncClient::new(options, 64);
        let prefix = self.config.topic_prefix.trim_end_matches('/').to_string();
        info!(
            target: "fleet.ingress",
            host = %self.config.host,
            port = self.config.port,
            prefix = %prefix,
            "mqtt_signal_source_started"
        );

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = eventloop.poll() => polled,
            };
            match polled {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    // clean session 下重连会丢失订阅
                    match subscribe_signals(&client, &prefix) {
                        Ok(()) => debug!(
                            target: "fleet.ingress",
                            prefix = %prefix,
                            "mqtt_signals_subscribed"
                        ),
                        Err(err) => warn!(
                            target: "fleet.ingress",
                            error = %err,
                            "mqtt_signal_subscribe_failed"
                        ),
                    }
                }
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                    let Some(signal) = parse_signal(&self.config.topic_prefix, &publish.topic)
                    else {
                        debug!(target: "fleet.ingress", topic = %publish.topic, "mqtt_topic_skipped");
                        continue;
                    };
                    let hub_id = signal.hub_id().to_string();
                    if let Err(err) = dispatch(handler.as_ref(), signal).await {
                        warn!(
                            target: "fleet.ingress",
                            hub_id = %hub_id,
                            error = %err,
                            "signal_handler_failed"
                        );
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(target: "fleet.ingress", error = %err, "mqtt_signal_poll_failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
        let _ = client.disconnect().await;
        Ok(())
    }
}

fn subscribe_signals(client: &rumqttc::AsyncClient, prefix: &str) -> Result<(), IngressError> {
    for kind in ["online", "offline"] {
        client
            .try_subscribe(format!("{prefix}/{kind}/#"), rumqttc::QoS::AtLeastOnce)
            .map_err(|err| IngressError::Source(err.to_string()))?;
    }
    Ok(())
}

/// 解析信号 topic；不符合约定返回 None。
pub fn parse_signal(prefix: &str, topic: &str) -> Option<HubSignal> {
    let prefix = prefix.trim_matches('/');
    let topic = topic.trim_matches('/');
    let rest = if prefix.is_empty() {
        topic
    } else {
        topic.strip_prefix(prefix)?.strip_prefix('/')?
    };
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    match parts.as_slice() {
        ["online", partition, hub_id, source_id] => Some(HubSignal::Heartbeat {
            hub_id: hub_id.to_string(),
            partition_id: partition.parse().ok()?,
            source_id: source_id.to_string(),
        }),
        ["offline", hub_id, source_id] => Some(HubSignal::Absence {
            hub_id: hub_id.to_string(),
            source_id: source_id.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::PartitionId;

    struct IgnoringHandler;

    #[async_trait]
    impl SignalHandler for IgnoringHandler {
        async fn on_heartbeat(
            &self,
            _hub_id: &str,
            _partition_id: PartitionId,
            _source_id: &str,
        ) -> Result<(), IngressError> {
            Ok(())
        }

        async fn on_absence(&self, _hub_id: &str, _source_id: &str) -> Result<(), IngressError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unreachable_broker_keeps_source_running_until_cancelled() {
        // 端口 1 无 broker，poll 持续失败
        let source = MqttSignalSource::new(MqttSignalSourceConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: None,
            password: None,
            topic_prefix: "fleet/signals".to_string(),
        });
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { source.run(Arc::new(IgnoringHandler), cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("source stops after cancel")
            .expect("source task");
        assert!(result.is_ok());
    }

    #[test]
    fn parses_heartbeat_topic() {
        let signal = parse_signal("fleet/signals", "fleet/signals/online/5/HUB-0001/bridge-a");
        assert_eq!(
            signal,
            Some(HubSignal::Heartbeat {
                hub_id: "HUB-0001".to_string(),
                partition_id: 5,
                source_id: "bridge-a".to_string(),
            })
        );
    }

    #[test]
    fn parses_absence_topic() {
        let signal = parse_signal("fleet/signals/", "fleet/signals/offline/HUB-0001/bridge-a");
        assert_eq!(
            signal,
            Some(HubSignal::Absence {
                hub_id: "HUB-0001".to_string(),
                source_id: "bridge-a".to_string(),
            })
        );
    }

    #[test]
    fn rejects_malformed_topics() {
        let prefix = "fleet/signals";
        assert_eq!(parse_signal(prefix, "fleet/signals/online/x/HUB-0001/bridge-a"), None);
        assert_eq!(parse_signal(prefix, "fleet/signals/online/5/HUB-0001"), None);
        assert_eq!(parse_signal(prefix, "fleet/signals/offline/HUB-0001//"), None);
        assert_eq!(parse_signal(prefix, "fleet/signalsx/offline/HUB-0001/bridge-a"), None);
        assert_eq!(parse_signal(prefix, "other/offline/HUB-0001/bridge-a"), None);
    }

    #[test]
    fn empty_prefix_matches_root() {
        assert!(parse_signal("", "offline/HUB-0001/bridge-a").is_some());
    }
}
