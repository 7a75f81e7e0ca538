//! 按配置构建 place → 人群映射。

use domain::Population;
use fleet_events::StaticPopulationResolver;
use std::collections::BTreeMap;

pub fn resolver_from_config(
    place_populations: &BTreeMap<String, String>,
    default_population: &str,
) -> StaticPopulationResolver {
    place_populations.iter().fold(
        StaticPopulationResolver::new().with_fallback(Population::new(default_population)),
        |resolver, (place_id, population)| {
            resolver.with_place(place_id.clone(), Population::new(population.clone()))
        },
    )
}
