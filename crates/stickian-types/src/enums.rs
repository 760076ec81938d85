//! Enumeration types for the Stickian engine.
//!
//! Wire names of buildings and resources match the web client's JSON
//! (`city_Hall`, `crystal_Mine`, ...), so the serde renames below are part
//! of the public contract.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

/// A building kind that can be upgraded in a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum BuildingKind {
    /// The city's administrative centre.
    #[serde(rename = "city_Hall")]
    CityHall,
    /// Produces food for the population.
    #[serde(rename = "farm")]
    Farm,
    /// Produces stone.
    #[serde(rename = "quarry")]
    Quarry,
    /// Produces sticks.
    #[serde(rename = "lumbermill")]
    LumberMill,
    /// Produces crystal.
    #[serde(rename = "crystal_Mine")]
    CrystalMine,
}

impl BuildingKind {
    /// Number of building kinds.
    pub const COUNT: usize = 5;

    /// Every building kind, in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::CityHall,
        Self::Farm,
        Self::Quarry,
        Self::LumberMill,
        Self::CrystalMine,
    ];

    /// Dense index of this kind, for array-backed lookup tables.
    pub const fn index(self) -> usize {
        match self {
            Self::CityHall => 0,
            Self::Farm => 1,
            Self::Quarry => 2,
            Self::LumberMill => 3,
            Self::CrystalMine => 4,
        }
    }

    /// The wire name used by clients and in idempotency keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CityHall => "city_Hall",
            Self::Farm => "farm",
            Self::Quarry => "quarry",
            Self::LumberMill => "lumbermill",
            Self::CrystalMine => "crystal_Mine",
        }
    }
}

impl fmt::Display for BuildingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildingKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseKindError {
                what: "building",
                value: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A resource held by a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Inhabitants of the city.
    Population,
    /// Quarried stone.
    Stone,
    /// Sticks from the lumber mill.
    Sticks,
    /// Mined crystal.
    Crystal,
    /// Gold.
    Gold,
}

impl ResourceKind {
    /// Every resource kind.
    pub const ALL: [Self; 5] = [
        Self::Population,
        Self::Stone,
        Self::Sticks,
        Self::Crystal,
        Self::Gold,
    ];

    /// The wire name used by clients.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Population => "population",
            Self::Stone => "stone",
            Self::Sticks => "sticks",
            Self::Crystal => "crystal",
            Self::Gold => "gold",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseKindError {
                what: "resource",
                value: s.to_owned(),
            })
    }
}

/// A building or resource name that does not match any known kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKindError {
    /// Which enumeration was being parsed.
    pub what: &'static str,
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for ParseKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.what, self.value)
    }
}

impl std::error::Error for ParseKindError {}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Kind tag of an [`Event`](crate::Event).
///
/// Serialized as a numeric code. The code doubles as the tie-break
/// priority for events sharing a timestamp: lower codes apply first, so a
/// completion is applied before a request in the same instant. Codes this
/// engine does not know decode to [`EventKind::Unknown`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum EventKind {
    /// A queued upgrade has finished.
    UpgradeCompleted,
    /// A client asked for a building upgrade.
    UpgradeRequested,
    /// A kind written by a newer engine.
    Unknown(u16),
}

impl EventKind {
    /// The numeric wire code of this kind.
    pub const fn code(self) -> u16 {
        match self {
            Self::UpgradeCompleted => 1,
            Self::UpgradeRequested => 2,
            Self::Unknown(code) => code,
        }
    }

    /// Ordering priority for events with identical timestamps (lower first).
    pub const fn priority(self) -> u16 {
        self.code()
    }
}

impl From<u16> for EventKind {
    fn from(code: u16) -> Self {
        match code {
            1 => Self::UpgradeCompleted,
            2 => Self::UpgradeRequested,
            other => Self::Unknown(other),
        }
    }
}

impl From<EventKind> for u16 {
    fn from(kind: EventKind) -> Self {
        kind.code()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpgradeCompleted => f.write_str("upgrade_completed"),
            Self::UpgradeRequested => f.write_str("upgrade_requested"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}
