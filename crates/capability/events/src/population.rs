//! Place → 人群标签解析。

use domain::Population;
use std::collections::HashMap;

/// 根据 place 解析人群标签；未知或缺失的 place 归为默认人群。
pub trait PopulationResolver: Send + Sync {
    fn population_for(&self, place_id: Option<&str>) -> Population;
}

/// 固定映射表实现。
#[derive(Debug, Clone, Default)]
pub struct StaticPopulationResolver {
    by_place: HashMap<String, Population>,
    fallback: Population,
}

impl StaticPopulationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, place_id: impl Into<String>, population: Population) -> Self {
        self.by_place.insert(place_id.into(), population);
        self
    }

    pub fn with_fallback(mut self, population: Population) -> Self {
        self.fallback = population;
        self
    }
}

impl PopulationResolver for StaticPopulationResolver {
    fn population_for(&self, place_id: Option<&str>) -> Population {
        place_id
            .and_then(|place_id| self.by_place.get(place_id))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
