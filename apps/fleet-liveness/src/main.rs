//! Hub 在线状态服务：装配存储、事件总线、注册表、分区归属与信号接入，
//! 并提供只读状态接口。

mod population;
mod signals;
mod status;

use fleet_config::AppConfig;
use fleet_events::{EventEmitter, MqttEventBus, MqttEventBusConfig};
use fleet_partition::PartitionMembership;
use fleet_registry::{
    HubRegistryService, LivenessRegistry, PartitionReconciler, SystemClock, TimeoutSweeper,
};
use fleet_storage::PgLivenessStore;
use fleet_telemetry::init_tracing;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // Postgres 在线状态存储（需先执行 migrations）
    let store = Arc::new(PgLivenessStore::connect(&config.database_url).await?);

    // 上下线事件总线
    let (bus, event_loop) = MqttEventBus::connect(MqttEventBusConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        topic_prefix: config.mqtt_event_topic_prefix.clone(),
        qos: config.mqtt_event_qos,
    })?;
    let populations =
        population::resolver_from_config(&config.place_populations, &config.default_population);
    let emitter = EventEmitter::new(Arc::new(bus), Arc::new(populations));

    let registry = Arc::new(LivenessRegistry::new(
        store,
        emitter,
        Arc::new(SystemClock),
        config.registry.offline_timeout,
    ));
    let cancel = CancellationToken::new();
    let reconciler = Arc::new(PartitionReconciler::new(
        Arc::clone(&registry),
        cancel.child_token(),
    ));
    let sweeper = Arc::new(TimeoutSweeper::new(
        Arc::clone(&registry),
        config.registry.sweep_interval,
    ));
    let service = HubRegistryService::new(Arc::clone(&registry), reconciler, sweeper, cancel.clone());

    // 分区归属：启动时按配置一次性认领
    let membership = Arc::new(PartitionMembership::new(config.partition_count));
    membership.assign(config.owned_partitions.iter().copied());
    service.start(&membership);

    let ingress = signals::spawn_ingress(&config, Arc::clone(&registry), cancel.child_token());

    let app = status::router(status::AppState { registry }).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(
        target: "fleet.liveness",
        http_addr = %config.http_addr,
        partitions = config.owned_partitions.len(),
        "fleet_liveness_started"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.stop().await;
    if let Err(err) = ingress.await {
        warn!(target: "fleet.liveness", error = %err, "ingress_task_failed");
    }
    event_loop.abort();
    info!(target: "fleet.liveness", "fleet_liveness_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "fleet.liveness", error = %err, "shutdown_signal_failed");
    }
}
