use fleet_config::AppConfig;
use std::time::Duration;

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("FLEET_DATABASE_URL", "postgres://fleet@localhost/fleet");
        std::env::set_var("FLEET_HTTP_ADDR", "127.0.0.1:8091");
        std::env::set_var("FLEET_OFFLINE_TIMEOUT_SECONDS", "300");
        std::env::set_var("FLEET_PARTITION_COUNT", "16");
        std::env::set_var("FLEET_OWNED_PARTITIONS", "0-3,8");
        std::env::set_var("FLEET_PLACE_POPULATIONS", "place-1=beta,place-2=alpha");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8091");
    assert_eq!(config.registry.offline_timeout, Duration::from_secs(300));
    assert_eq!(config.registry.sweep_interval, Duration::from_secs(60));
    assert_eq!(config.partition_count, 16);
    assert_eq!(
        config.owned_partitions,
        [0, 1, 2, 3, 8].into_iter().collect()
    );
    assert_eq!(
        config.place_populations.get("place-1").map(String::as_str),
        Some("beta")
    );
    assert_eq!(config.place_populations.len(), 2);
    assert_eq!(config.default_population, "general");

    unsafe {
        std::env::set_var("FLEET_PLACE_POPULATIONS", "place-1");
    }
    assert!(AppConfig::from_env().is_err());
    unsafe {
        std::env::remove_var("FLEET_PLACE_POPULATIONS");
    }

    unsafe {
        std::env::set_var("FLEET_OWNED_PARTITIONS", "12-40");
    }
    assert!(AppConfig::from_env().is_err());

    unsafe {
        std::env::remove_var("FLEET_OWNED_PARTITIONS");
        std::env::set_var("FLEET_SWEEP_INTERVAL_SECONDS", "0");
    }
    assert!(AppConfig::from_env().is_err());
}
