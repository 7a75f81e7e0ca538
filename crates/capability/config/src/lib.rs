//! 应用运行配置加载。

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 在线注册表参数（仅在进程启动时读取）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// 最近心跳早于 `now - offline_timeout` 的 Hub 视为离线。
    pub offline_timeout: Duration,
    /// 两次超时扫描之间的固定间隔。
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            offline_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub registry: RegistryConfig,
    pub partition_count: u32,
    pub owned_partitions: BTreeSet<u32>,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_signal_topic_prefix: String,
    pub mqtt_event_topic_prefix: String,
    pub mqtt_event_qos: u8,
    pub ingress_enabled: bool,
    /// place id → 人群标签。
    pub place_populations: BTreeMap<String, String>,
    /// 未映射或缺失 place 时使用的人群标签。
    pub default_population: String,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("FLEET_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("FLEET_DATABASE_URL".to_string()))?;
        let http_addr =
            env::var("FLEET_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8090".to_string());
        let offline_timeout_seconds =
            read_positive_u64_with_default("FLEET_OFFLINE_TIMEOUT_SECONDS", 600)?;
        let sweep_interval_seconds =
            read_positive_u64_with_default("FLEET_SWEEP_INTERVAL_SECONDS", 60)?;
        let partition_count = read_u32_with_default("FLEET_PARTITION_COUNT", 128)?;
        if partition_count == 0 {
            return Err(ConfigError::Invalid(
                "FLEET_PARTITION_COUNT".to_string(),
                "0".to_string(),
            ));
        }
        let owned_partitions = match read_optional("FLEET_OWNED_PARTITIONS") {
            Some(value) => parse_partitions(&value, partition_count)
                .ok_or_else(|| ConfigError::Invalid("FLEET_OWNED_PARTITIONS".to_string(), value))?,
            None => (0..partition_count).collect(),
        };
        let mqtt_host = env::var("FLEET_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("FLEET_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("FLEET_MQTT_USERNAME");
        let mqtt_password = read_optional("FLEET_MQTT_PASSWORD");
        let mqtt_signal_topic_prefix = env::var("FLEET_MQTT_SIGNAL_TOPIC_PREFIX")
            .unwrap_or_else(|_| "fleet/signals".to_string());
        let mqtt_event_topic_prefix = env::var("FLEET_MQTT_EVENT_TOPIC_PREFIX")
            .unwrap_or_else(|_| "fleet/events".to_string());
        let mqtt_event_qos = read_u8_with_default("FLEET_MQTT_EVENT_QOS", 1)?;
        let ingress_enabled = read_bool_with_default("FLEET_INGRESS", true);
        let place_populations = match read_optional("FLEET_PLACE_POPULATIONS") {
            Some(value) => parse_place_populations(&value).ok_or_else(|| {
                ConfigError::Invalid("FLEET_PLACE_POPULATIONS".to_string(), value)
            })?,
            None => BTreeMap::new(),
        };
        let default_population =
            read_optional("FLEET_DEFAULT_POPULATION").unwrap_or_else(|| "general".to_string());

        Ok(Self {
            http_addr,
            database_url,
            registry: RegistryConfig {
                offline_timeout: Duration::from_secs(offline_timeout_seconds),
                sweep_interval: Duration::from_secs(sweep_interval_seconds),
            },
            partition_count,
            owned_partitions,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_signal_topic_prefix,
            mqtt_event_topic_prefix,
            mqtt_event_qos,
            ingress_enabled,
            place_populations,
            default_population,
        })
    }
}

/// 解析分区列表，例如 `0-15,32,40-41`；越界、空列表或反向区间返回 None。
pub fn parse_partitions(value: &str, partition_count: u32) -> Option<BTreeSet<u32>> {
    let mut partitions = BTreeSet::new();
    for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (
                start.trim().parse::<u32>().ok()?,
                end.trim().parse::<u32>().ok()?,
            ),
            None => {
                let single = part.parse::<u32>().ok()?;
                (single, single)
            }
        };
        if start > end || end >= partition_count {
            return None;
        }
        partitions.extend(start..=end);
    }
    if partitions.is_empty() {
        return None;
    }
    Some(partitions)
}

/// 解析 `place-1=beta,place-2=alpha`；缺少 `=` 或任一侧为空返回 None。
pub fn parse_place_populations(value: &str) -> Option<BTreeMap<String, String>> {
    let mut populations = BTreeMap::new();
    for pair in value.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (place_id, population) = pair.split_once('=')?;
        let (place_id, population) = (place_id.trim(), population.trim());
        if place_id.is_empty() || population.is_empty() {
            return None;
        }
        populations.insert(place_id.to_string(), population.to_string());
    }
    Some(populations)
}

fn read_positive_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
