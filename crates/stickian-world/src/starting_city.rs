//! Seed state for a freshly founded city.
//!
//! Values match the development fixture the web client was built against:
//! a mid-game "Stick City" with every building standing.

use std::collections::BTreeMap;

use stickian_types::{BuildingKind, CityId, CityState, ResourceKind};

/// Display name of the seeded city.
pub const STARTING_CITY_NAME: &str = "Stick City";

/// Build the seeded starting city under `id`.
pub fn starting_city(id: CityId) -> CityState {
    CityState {
        id,
        name: STARTING_CITY_NAME.to_owned(),
        buildings: BTreeMap::from([
            (BuildingKind::CityHall, 4),
            (BuildingKind::Farm, 2),
            (BuildingKind::Quarry, 2),
            (BuildingKind::LumberMill, 2),
            (BuildingKind::CrystalMine, 3),
        ]),
        resources: BTreeMap::from([
            (ResourceKind::Population, 45),
            (ResourceKind::Stone, 215),
            (ResourceKind::Sticks, 312),
            (ResourceKind::Crystal, 145),
            (ResourceKind::Gold, 18),
        ]),
        upgrade_queue: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn starting_city_has_every_building() {
        let city = starting_city(CityId::new());
        for building in BuildingKind::ALL {
            assert!(city.level(building) >= 1, "{building} missing");
        }
        assert!(city.upgrade_queue.is_empty());
    }

    #[test]
    fn starting_levels_are_within_catalog() {
        let city = starting_city(CityId::new());
        let catalog = Catalog::standard();
        for building in BuildingKind::ALL {
            assert!(city.level(building) <= catalog.max_level(building));
        }
    }

    #[test]
    fn starting_city_serializes_for_client() {
        let city = starting_city(CityId::new());
        let value = serde_json::to_value(&city).unwrap_or_default();
        assert_eq!(value["cityName"], STARTING_CITY_NAME);
        assert_eq!(value["resources"]["sticks"], 312);
    }
}
