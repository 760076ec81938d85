//! Core structs: events, their payloads, and per-city state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{BuildingKind, EventKind, ResourceKind};
use crate::ids::{CityId, EventKey};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// An immutable intent or fact waiting in the event store.
///
/// Events are created at admission or by the tick processor, read once by
/// the processor for their scheduled tick, and never mutated. The payload
/// is kept as raw JSON so that events of unknown kinds or with malformed
/// bodies survive storage and are rejected only when processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Idempotency key, unique within the scheduled tick bucket.
    pub key: EventKey,
    /// Kind tag; selects the transition applied to the payload.
    pub kind: EventKind,
    /// Tick at which this event becomes eligible for processing.
    pub scheduled_tick: u64,
    /// Server-assigned timestamp; fine-grained ordering within a tick.
    pub occurred_at: DateTime<Utc>,
    /// Kind-specific body.
    pub payload: serde_json::Value,
}

impl Event {
    /// Build an [`EventKind::UpgradeRequested`] event for `payload`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload cannot be encoded.
    pub fn upgrade_requested(
        payload: &UpgradePayload,
        scheduled_tick: u64,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            key: payload.request_key(),
            kind: EventKind::UpgradeRequested,
            scheduled_tick,
            occurred_at,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Build an [`EventKind::UpgradeCompleted`] event for `payload`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload cannot be encoded.
    pub fn upgrade_completed(
        payload: &UpgradePayload,
        scheduled_tick: u64,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            key: payload.completion_key(),
            kind: EventKind::UpgradeCompleted,
            scheduled_tick,
            occurred_at,
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// Body shared by upgrade requests and upgrade completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct UpgradePayload {
    /// The city whose building is upgraded.
    #[serde(rename = "cityID")]
    pub city_id: CityId,
    /// The building being upgraded.
    pub building: BuildingKind,
    /// The level the building is upgraded to.
    pub level: u32,
}

impl UpgradePayload {
    /// Idempotency key of the request; a resubmission maps to the same key.
    pub fn request_key(&self) -> EventKey {
        EventKey::new(format!(
            "upgrade:{}:{}:{}",
            self.city_id, self.building, self.level
        ))
    }

    /// Idempotency key of the completion; depends only on city, building,
    /// and level, so re-deriving a completion never yields a second event.
    pub fn completion_key(&self) -> EventKey {
        EventKey::new(format!(
            "upgrade-complete:{}:{}:{}",
            self.city_id, self.building, self.level
        ))
    }
}

// ---------------------------------------------------------------------------
// City state
// ---------------------------------------------------------------------------

/// Mutable simulation state of one city.
///
/// Written only by the tick processor. Building levels never decrease and
/// resource balances never go negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct CityState {
    /// City identifier.
    pub id: CityId,
    /// Display name.
    #[serde(rename = "cityName")]
    pub name: String,
    /// Current level of each building; absent means level 0.
    pub buildings: BTreeMap<BuildingKind, u32>,
    /// Balance of each resource; absent means 0.
    pub resources: BTreeMap<ResourceKind, u64>,
    /// In-flight upgrades, in acceptance order.
    #[serde(rename = "buildingsQueue")]
    pub upgrade_queue: Vec<UpgradeQueueItem>,
}

impl CityState {
    /// Create an empty city with no buildings or resources.
    pub fn new(id: CityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            buildings: BTreeMap::new(),
            resources: BTreeMap::new(),
            upgrade_queue: Vec::new(),
        }
    }

    /// Current level of `building` (0 if never built).
    pub fn level(&self, building: BuildingKind) -> u32 {
        self.buildings.get(&building).copied().unwrap_or(0)
    }

    /// Current balance of `resource` (0 if absent).
    pub fn balance(&self, resource: ResourceKind) -> u64 {
        self.resources.get(&resource).copied().unwrap_or(0)
    }

    /// The queued upgrade of `building` to `level`, if any.
    pub fn queued(&self, building: BuildingKind, level: u32) -> Option<&UpgradeQueueItem> {
        self.upgrade_queue
            .iter()
            .find(|item| item.building == building && item.level == level)
    }

    /// Number of queued upgrades for `building`.
    pub fn pending_for(&self, building: BuildingKind) -> usize {
        self.upgrade_queue
            .iter()
            .filter(|item| item.building == building)
            .count()
    }
}

/// One in-flight upgrade.
///
/// Each queue item corresponds to exactly one outstanding
/// [`EventKind::UpgradeCompleted`] event, scheduled at `complete_tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct UpgradeQueueItem {
    /// The building being upgraded.
    pub building: BuildingKind,
    /// Target level.
    pub level: u32,
    /// Wall-clock time the upgrade finishes.
    pub complete_time: DateTime<Utc>,
    /// Tick bucket holding the completion event.
    pub complete_tick: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn payload() -> UpgradePayload {
        UpgradePayload {
            city_id: CityId::new(),
            building: BuildingKind::Farm,
            level: 3,
        }
    }

    #[test]
    fn request_and_completion_keys_are_deterministic() {
        let payload = payload();
        assert_eq!(payload.request_key(), payload.request_key());
        assert_eq!(payload.completion_key(), payload.completion_key());
        assert_ne!(payload.request_key(), payload.completion_key());
        assert_eq!(
            payload.request_key().as_str(),
            format!("upgrade:{}:farm:3", payload.city_id)
        );
    }

    #[test]
    fn payload_uses_client_field_names() {
        let payload = payload();
        let value = serde_json::to_value(payload).unwrap();
        assert_eq!(value["building"], "farm");
        assert_eq!(value["level"], 3);
        assert!(value.get("cityID").is_some());
    }

    #[test]
    fn completion_event_carries_payload() {
        let payload = payload();
        let at = Utc::now();
        let event = Event::upgrade_completed(&payload, 12, at).unwrap();
        assert_eq!(event.kind, EventKind::UpgradeCompleted);
        assert_eq!(event.scheduled_tick, 12);
        let decoded: UpgradePayload = serde_json::from_value(event.payload).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn city_defaults_missing_entries_to_zero() {
        let city = CityState::new(CityId::new(), "Empty");
        assert_eq!(city.level(BuildingKind::Quarry), 0);
        assert_eq!(city.balance(ResourceKind::Gold), 0);
        assert_eq!(city.pending_for(BuildingKind::Quarry), 0);
    }

    #[test]
    fn city_json_matches_client_shape() {
        let mut city = CityState::new(CityId::new(), "Stick City");
        city.buildings.insert(BuildingKind::CityHall, 4);
        city.resources.insert(ResourceKind::Stone, 215);
        let value = serde_json::to_value(&city).unwrap();
        assert_eq!(value["cityName"], "Stick City");
        assert_eq!(value["buildings"]["city_Hall"], 4);
        assert_eq!(value["resources"]["stone"], 215);
        assert!(value["buildingsQueue"].as_array().is_some_and(Vec::is_empty));
    }
}
