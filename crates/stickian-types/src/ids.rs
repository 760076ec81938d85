//! Identifier types for cities and events.
//!
//! Cities are keyed by UUID v7 (time-ordered). Events are keyed by a
//! string idempotency key derived from their content, so two deliveries
//! of the same logical event collide in the event store.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Unique identifier for a city (one simulated game instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CityId(pub Uuid);

impl CityId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CityId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for CityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CityId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<CityId> for Uuid {
    fn from(id: CityId) -> Self {
        id.0
    }
}

/// Idempotency key of an [`Event`](crate::Event).
///
/// Keys are unique within a tick bucket. Inserting a second event with the
/// same key into the same bucket is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKey(String);

impl EventKey {
    /// Wrap a pre-built key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EventKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_id_display_matches_uuid() {
        let id = CityId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }

    #[test]
    fn city_ids_are_distinct() {
        assert_ne!(CityId::new(), CityId::new());
        assert_ne!(CityId::new().into_inner(), Uuid::nil());
    }

    #[test]
    fn event_key_serializes_as_plain_string() {
        let key = EventKey::new("upgrade:abc:farm:3");
        let json = serde_json::to_string(&key).ok();
        assert_eq!(json.as_deref(), Some("\"upgrade:abc:farm:3\""));
    }
}
