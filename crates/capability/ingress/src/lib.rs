//! 心跳/断开信号接入。
//!
//! 上游负责判定 Hub 所属分区与来源标识，这里只做解码与分发。

pub mod mqtt;

pub use mqtt::{MqttSignalSource, MqttSignalSourceConfig, parse_signal};

use async_trait::async_trait;
use domain::{HubSignal, PartitionId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 接入错误。
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("source error: {0}")]
    Source(String),
    #[error("handler error: {0}")]
    Handler(String),
}

/// 信号处理器。
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn on_heartbeat(
        &self,
        hub_id: &str,
        partition_id: PartitionId,
        source_id: &str,
    ) -> Result<(), IngressError>;

    async fn on_absence(&self, hub_id: &str, source_id: &str) -> Result<(), IngressError>;
}

/// 把一条信号分发到处理器。
pub async fn dispatch(handler: &dyn SignalHandler, signal: HubSignal) -> Result<(), IngressError> {
    match signal {
        HubSignal::Heartbeat {
            hub_id,
            partition_id,
            source_id,
        } => handler.on_heartbeat(&hub_id, partition_id, &source_id).await,
        HubSignal::Absence { hub_id, source_id } => handler.on_absence(&hub_id, &source_id).await,
    }
}

/// 信号源抽象：持续投递信号直到取消或源关闭。
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn run(
        &self,
        handler: Arc<dyn SignalHandler>,
        cancel: CancellationToken,
    ) -> Result<(), IngressError>;
}

/// 占位源（关闭接入时使用）。
#[derive(Debug, Default)]
pub struct NoopSource;

#[async_trait]
impl SignalSource for NoopSource {
    async fn run(
        &self,
        _handler: Arc<dyn SignalHandler>,
        _cancel: CancellationToken,
    ) -> Result<(), IngressError> {
        Ok(())
    }
}

/// 进程内通道源（本地联调与测试）。
pub struct ChannelSignalSource {
    rx: tokio::sync::Mutex<mpsc::Receiver<HubSignal>>,
}

impl ChannelSignalSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<HubSignal>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                rx: tokio::sync::Mutex::new(rx),
            },
        )
    }
}

#[async_trait]
impl SignalSource for ChannelSignalSource {
    async fn run(
        &self,
        handler: Arc<dyn SignalHandler>,
        cancel: CancellationToken,
    ) -> Result<(), IngressError> {
        let mut rx = self.rx.lock().await;
        loop {
            let signal = tokio::select! {
                _ = cancel.cancelled() => break,
                signal = rx.recv() => signal,
            };
            let Some(signal) = signal else {
                debug!(target: "fleet.ingress", "signal_channel_closed");
                break;
            };
            let hub_id = signal.hub_id().to_string();
            if let Err(err) = dispatch(handler.as_ref(), signal).await {
                warn!(target: "fleet.ingress", hub_id = %hub_id, error = %err, "signal_handler_failed");
            }
        }
        Ok(())
    }
}
