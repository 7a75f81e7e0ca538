//! Hub 持久化记录与状态变更。

use std::collections::BTreeMap;
use std::fmt;

/// Hub 基础状态属性名。
pub const ATTR_HUB_STATE: &str = "hub:state";
/// Hub 连接状态属性名。
pub const ATTR_CONN_STATE: &str = "hubconn:state";
/// 连接状态最后变更时间（epoch 毫秒）。
pub const ATTR_CONN_LAST_CHANGE: &str = "hubconn:lastchange";

/// 持久化的连接状态。
///
/// `Down` 由管理员设置，属于终态：即便 Hub 可达也不参与在线跟踪。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubState {
    Online,
    Offline,
    Down,
}

impl HubState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubState::Online => "ONLINE",
            HubState::Offline => "OFFLINE",
            HubState::Down => "DOWN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ONLINE" => Some(HubState::Online),
            "OFFLINE" => Some(HubState::Offline),
            "DOWN" => Some(HubState::Down),
            _ => None,
        }
    }

    pub fn is_down(&self) -> bool {
        matches!(self, HubState::Down)
    }
}

impl fmt::Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 存储中的 Hub 记录（只读视图）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubRecord {
    pub hub_id: String,
    pub place_id: Option<String>,
    pub partition_id: crate::PartitionId,
    pub state: HubState,
}

impl HubRecord {
    pub fn new(
        hub_id: impl Into<String>,
        place_id: Option<String>,
        partition_id: crate::PartitionId,
        state: HubState,
    ) -> Self {
        Self {
            hub_id: hub_id.into(),
            place_id,
            partition_id,
            state,
        }
    }
}

/// 一次状态迁移实际改变的属性集合。
///
/// 为空表示存储侧没有发生迁移（重复信号、已是目标状态等）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedAttributes(BTreeMap<String, String>);

impl ChangedAttributes {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 上线迁移对应的属性集合。
    pub fn connected(ts_ms: i64) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert(ATTR_HUB_STATE.to_string(), "NORMAL".to_string());
        attrs.insert(ATTR_CONN_STATE.to_string(), HubState::Online.as_str().to_string());
        attrs.insert(ATTR_CONN_LAST_CHANGE.to_string(), ts_ms.to_string());
        Self(attrs)
    }

    /// 离线迁移对应的属性集合。
    pub fn disconnected(ts_ms: i64) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert(ATTR_HUB_STATE.to_string(), "DOWN".to_string());
        attrs.insert(ATTR_CONN_STATE.to_string(), HubState::Offline.as_str().to_string());
        attrs.insert(ATTR_CONN_LAST_CHANGE.to_string(), ts_ms.to_string());
        Self(attrs)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl FromIterator<(String, String)> for ChangedAttributes {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Place 所属人群标签。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Population(String);

impl Population {
    pub const GENERAL: &'static str = "general";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn general() -> Self {
        Self(Self::GENERAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Population {
    fn default() -> Self {
        Self::general()
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hub 服务地址（事件来源）。
pub fn hub_address(hub_id: &str) -> String {
    format!("SERV:hub:{}", hub_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_parse_is_case_insensitive() {
        assert_eq!(HubState::parse("online"), Some(HubState::Online));
        assert_eq!(HubState::parse(" DOWN "), Some(HubState::Down));
        assert_eq!(HubState::parse("normal"), None);
    }

    #[test]
    fn disconnected_attributes_mark_offline() {
        let attrs = ChangedAttributes::disconnected(42);
        assert_eq!(attrs.get(ATTR_CONN_STATE), Some("OFFLINE"));
        assert_eq!(attrs.get(ATTR_CONN_LAST_CHANGE), Some("42"));
        assert!(!attrs.is_empty());
    }

    #[test]
    fn hub_address_uses_service_namespace() {
        assert_eq!(hub_address("HUB-0001"), "SERV:hub:HUB-0001");
    }
}
