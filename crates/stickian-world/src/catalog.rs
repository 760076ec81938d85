//! Static cost and duration table for building upgrades.
//!
//! The [`Catalog`] maps `(building, target level)` to an [`UpgradeSpec`].
//! It is built once at startup and then only read. Lookups index a dense
//! per-building array by `level - 1`; a missing entry means the upgrade
//! does not exist and any event referencing it is invalid.

use std::collections::BTreeMap;
use std::time::Duration;

use stickian_types::{BuildingKind, ResourceKind};

use crate::error::WorldError;

/// Resource cost of a single upgrade, keyed by resource.
pub type ResourceCost = BTreeMap<ResourceKind, u64>;

/// Cost and build time of reaching one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeSpec {
    /// Resources deducted when the upgrade is accepted.
    pub cost: ResourceCost,
    /// Time from acceptance to completion.
    pub duration: Duration,
}

/// Immutable upgrade lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// `levels[building.index()][level - 1]`.
    levels: [Vec<UpgradeSpec>; BuildingKind::COUNT],
}

impl Catalog {
    /// The standard game balance table, levels 1 through 5 for every building.
    pub fn standard() -> Self {
        let mut levels: [Vec<UpgradeSpec>; BuildingKind::COUNT] = Default::default();
        for building in BuildingKind::ALL {
            let table = match building {
                BuildingKind::CityHall => &CITY_HALL_COSTS,
                BuildingKind::Farm
                | BuildingKind::Quarry
                | BuildingKind::LumberMill
                | BuildingKind::CrystalMine => &PRODUCER_COSTS,
            };
            let specs = table
                .iter()
                .zip(DURATIONS_SECS)
                .map(|(&[stone, sticks, crystal, gold], secs)| UpgradeSpec {
                    cost: BTreeMap::from([
                        (ResourceKind::Stone, stone),
                        (ResourceKind::Sticks, sticks),
                        (ResourceKind::Crystal, crystal),
                        (ResourceKind::Gold, gold),
                    ]),
                    duration: Duration::from_secs(secs),
                })
                .collect();
            if let Some(slot) = levels.get_mut(building.index()) {
                *slot = specs;
            }
        }
        Self { levels }
    }

    /// Build a catalog from explicit `(building, level, spec)` entries.
    ///
    /// Entries may arrive in any order, but for each building the levels
    /// present must form the range `1..=n`. Buildings with no entries cannot
    /// be upgraded at all.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NonContiguousLevels`] if a building's levels
    /// skip a value, repeat, or do not start at 1.
    pub fn from_specs(
        entries: impl IntoIterator<Item = (BuildingKind, u32, UpgradeSpec)>,
    ) -> Result<Self, WorldError> {
        let mut grouped: BTreeMap<BuildingKind, BTreeMap<u32, UpgradeSpec>> = BTreeMap::new();
        for (building, level, spec) in entries {
            let per_building = grouped.entry(building).or_default();
            if per_building.insert(level, spec).is_some() {
                return Err(WorldError::NonContiguousLevels { building, level });
            }
        }

        let mut levels: [Vec<UpgradeSpec>; BuildingKind::COUNT] = Default::default();
        for (building, specs) in grouped {
            let mut expected: u32 = 1;
            let mut ordered = Vec::with_capacity(specs.len());
            for (level, spec) in specs {
                if level != expected {
                    return Err(WorldError::NonContiguousLevels { building, level });
                }
                ordered.push(spec);
                expected = expected
                    .checked_add(1)
                    .ok_or(WorldError::ArithmeticOverflow)?;
            }
            if let Some(slot) = levels.get_mut(building.index()) {
                *slot = ordered;
            }
        }
        Ok(Self { levels })
    }

    /// The full spec for upgrading `building` to `level`.
    pub fn spec(&self, building: BuildingKind, level: u32) -> Option<&UpgradeSpec> {
        let offset = usize::try_from(level.checked_sub(1)?).ok()?;
        self.levels.get(building.index())?.get(offset)
    }

    /// Resource cost of upgrading `building` to `level`.
    pub fn cost(&self, building: BuildingKind, level: u32) -> Option<&ResourceCost> {
        self.spec(building, level).map(|spec| &spec.cost)
    }

    /// Build time of upgrading `building` to `level`.
    pub fn duration(&self, building: BuildingKind, level: u32) -> Option<Duration> {
        self.spec(building, level).map(|spec| spec.duration)
    }

    /// Highest level `building` can reach (0 if it has no entries).
    pub fn max_level(&self, building: BuildingKind) -> u32 {
        self.levels
            .get(building.index())
            .and_then(|specs| u32::try_from(specs.len()).ok())
            .unwrap_or(0)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Stone, sticks, crystal, gold for city hall levels 1..=5.
const CITY_HALL_COSTS: [[u64; 4]; 5] = [
    [100, 100, 50, 20],
    [200, 200, 100, 50],
    [400, 400, 200, 100],
    [800, 800, 400, 200],
    [1600, 1600, 800, 400],
];

/// Stone, sticks, crystal, gold for resource producers, levels 1..=5.
const PRODUCER_COSTS: [[u64; 4]; 5] = [
    [50, 50, 20, 10],
    [100, 100, 50, 20],
    [200, 200, 100, 50],
    [400, 400, 200, 100],
    [800, 800, 400, 200],
];

/// Seconds to complete levels 1..=5, shared by all buildings.
const DURATIONS_SECS: [u64; 5] = [10, 11, 12, 13, 14];
