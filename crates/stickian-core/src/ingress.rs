//! Request admission.
//!
//! [`Admission`] turns a client [`UpgradeRequest`] into a pending
//! [`Event`] stamped with the server time and the open tick. Validation here
//! is shallow: the request must name a real building and a catalog level.
//! The authoritative checks happen when the tick is processed, against the
//! state as of that tick.
//!
//! With prechecks enabled, requests that are plainly stale or unaffordable
//! against the last persisted state are refused early. Those checks are
//! advisory only: the stored state may be one tick old.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use stickian_db::{AddOutcome, CityStore, DbError, EventStore};
use stickian_types::{
    BuildingKind, CityId, CityState, Event, EventKey, ParseKindError, UpgradePayload,
};
use stickian_world::Catalog;
use tracing::{debug, info};

use crate::clock::{ClockError, TickCounter};

/// A client's request to upgrade one building by one level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    /// Target city.
    #[serde(rename = "cityID")]
    pub city_id: CityId,
    /// Building wire name, e.g. `farm` or `city_Hall`.
    pub building: String,
    /// Requested level.
    pub level: u32,
}

/// A request that made it into the event store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    /// Idempotency key of the stored event.
    pub key: EventKey,
    /// Tick bucket the event was placed in.
    pub tick: u64,
    /// Whether the event was new or a resubmission.
    pub outcome: AddOutcome,
}

/// Why a request was refused.
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// The building name is not recognised.
    #[error(transparent)]
    UnknownBuilding(#[from] ParseKindError),

    /// Levels start at 1.
    #[error("invalid level {0}: levels start at 1")]
    InvalidLevel(u32),

    /// The catalog has no entry for the requested upgrade.
    #[error("{building} level {level} does not exist")]
    NotInCatalog {
        /// Requested building.
        building: BuildingKind,
        /// Requested level.
        level: u32,
    },

    /// The city already has the requested level.
    #[error("{building} is already at level {current}")]
    Stale {
        /// Requested building.
        building: BuildingKind,
        /// Level in the stored state.
        current: u32,
    },

    /// The city cannot currently pay for the upgrade.
    #[error("not enough resources for {building} level {level}")]
    Unaffordable {
        /// Requested building.
        building: BuildingKind,
        /// Requested level.
        level: u32,
    },

    /// No city with this identifier exists.
    #[error("unknown city {0}")]
    UnknownCity(CityId),

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// The tick counter could not be read.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// The event payload could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl IngressError {
    /// Whether the request itself is at fault (as opposed to the server).
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownBuilding(_)
                | Self::InvalidLevel(_)
                | Self::NotInCatalog { .. }
                | Self::Stale { .. }
                | Self::Unaffordable { .. }
                | Self::UnknownCity(_)
        )
    }
}

/// Validates requests and appends them to the event store.
#[derive(Debug)]
pub struct Admission<E, C> {
    events: Arc<E>,
    cities: Arc<C>,
    catalog: Arc<Catalog>,
    counter: Arc<TickCounter>,
    precheck: bool,
    now: fn() -> DateTime<Utc>,
}

impl<E: EventStore, C: CityStore> Admission<E, C> {
    /// Create an admission front with prechecks enabled.
    pub fn new(
        events: Arc<E>,
        cities: Arc<C>,
        catalog: Arc<Catalog>,
        counter: Arc<TickCounter>,
    ) -> Self {
        Self {
            events,
            cities,
            catalog,
            counter,
            precheck: true,
            now: Utc::now,
        }
    }

    /// Enable or disable the advisory prechecks.
    #[must_use]
    pub const fn with_precheck(mut self, precheck: bool) -> Self {
        self.precheck = precheck;
        self
    }

    /// Replace the server clock (tests).
    #[must_use]
    pub const fn with_time_source(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Validate `request` and store it as an upgrade-requested event.
    ///
    /// Resubmitting a request within the same tick is harmless and reported
    /// as [`AddOutcome::Duplicate`].
    ///
    /// # Errors
    ///
    /// Returns an [`IngressError`] for invalid requests, failed prechecks,
    /// or store failures.
    pub fn submit_upgrade(&self, request: &UpgradeRequest) -> Result<Admitted, IngressError> {
        let building = BuildingKind::from_str(&request.building)?;
        let level = request.level;
        if level == 0 {
            return Err(IngressError::InvalidLevel(level));
        }
        let cost = self
            .catalog
            .cost(building, level)
            .ok_or(IngressError::NotInCatalog { building, level })?;

        if self.precheck {
            let city = self.city_status(request.city_id)?;
            let current = city.level(building);
            if current >= level {
                return Err(IngressError::Stale { building, current });
            }
            // A resubmission of an accepted request was already charged.
            let resubmitted = city.queued(building, level).is_some();
            if !resubmitted && !stickian_world::has_sufficient(&city.resources, cost) {
                return Err(IngressError::Unaffordable { building, level });
            }
        }

        let payload = UpgradePayload {
            city_id: request.city_id,
            building,
            level,
        };

        // The guard keeps the bucket open until the insert is done.
        let guard = self.counter.hold()?;
        let tick = guard.tick();
        let event = Event::upgrade_requested(&payload, tick, (self.now)())?;
        let key = event.key.clone();
        let outcome = self.events.add(event)?;
        drop(guard);

        match outcome {
            AddOutcome::Inserted => info!(key = %key, tick, "Upgrade request admitted"),
            AddOutcome::Duplicate => debug!(key = %key, tick, "Upgrade request resubmitted"),
        }
        Ok(Admitted { key, tick, outcome })
    }

    /// The last persisted state of `city_id`.
    ///
    /// # Errors
    ///
    /// Returns [`IngressError::UnknownCity`] if the city does not exist, or
    /// [`IngressError::Store`] if the store cannot be read.
    pub fn city_status(&self, city_id: CityId) -> Result<CityState, IngressError> {
        self.cities.get(city_id).map_err(|err| match err {
            DbError::CityNotFound(id) => IngressError::UnknownCity(id),
            other => IngressError::Store(other),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use stickian_db::{InMemoryCityStore, InMemoryEventStore};
    use stickian_types::{EventKind, ResourceKind};

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    struct Fixture {
        events: Arc<InMemoryEventStore>,
        counter: Arc<TickCounter>,
        admission: Admission<InMemoryEventStore, InMemoryCityStore>,
        city: CityId,
    }

    fn fixture(stone: u64) -> Fixture {
        let mut city = CityState::new(CityId::new(), "Test");
        city.buildings.insert(BuildingKind::Farm, 2);
        for resource in ResourceKind::ALL {
            city.resources.insert(resource, 10_000);
        }
        city.resources.insert(ResourceKind::Stone, stone);
        let id = city.id;

        let events = Arc::new(InMemoryEventStore::new());
        let counter = Arc::new(TickCounter::starting_at(7));
        let admission = Admission::new(
            Arc::clone(&events),
            Arc::new(InMemoryCityStore::with_cities([city])),
            Arc::new(Catalog::standard()),
            Arc::clone(&counter),
        )
        .with_time_source(fixed_now);
        Fixture {
            events,
            counter,
            admission,
            city: id,
        }
    }

    fn request(city: CityId, building: &str, level: u32) -> UpgradeRequest {
        UpgradeRequest {
            city_id: city,
            building: building.to_owned(),
            level,
        }
    }

    #[test]
    fn request_is_stamped_with_open_tick_and_server_time() {
        let f = fixture(10_000);
        let admitted = f.admission.submit_upgrade(&request(f.city, "farm", 3)).unwrap();

        assert_eq!(admitted.tick, 7);
        assert_eq!(admitted.outcome, AddOutcome::Inserted);
        let stored = f.events.list_for_tick(7).unwrap();
        assert_eq!(stored.len(), 1);
        let event = stored.first().unwrap();
        assert_eq!(event.kind, EventKind::UpgradeRequested);
        assert_eq!(event.occurred_at, fixed_now());
        assert_eq!(event.key, admitted.key);
    }

    #[test]
    fn resubmission_in_same_tick_is_duplicate() {
        let f = fixture(10_000);
        let req = request(f.city, "farm", 3);
        f.admission.submit_upgrade(&req).unwrap();
        let second = f.admission.submit_upgrade(&req).unwrap();
        assert_eq!(second.outcome, AddOutcome::Duplicate);
        assert_eq!(f.events.len().unwrap(), 1);
    }

    #[test]
    fn resubmission_after_tick_lands_in_new_bucket() {
        let f = fixture(10_000);
        let req = request(f.city, "farm", 3);
        f.admission.submit_upgrade(&req).unwrap();
        f.counter.advance().unwrap();
        let second = f.admission.submit_upgrade(&req).unwrap();
        assert_eq!(second.tick, 8);
        assert_eq!(second.outcome, AddOutcome::Inserted);
    }

    #[test]
    fn invalid_requests_are_refused() {
        let f = fixture(10_000);
        let unknown = f.admission.submit_upgrade(&request(f.city, "castle", 1));
        assert!(matches!(unknown, Err(IngressError::UnknownBuilding(_))));

        let zero = f.admission.submit_upgrade(&request(f.city, "farm", 0));
        assert!(matches!(zero, Err(IngressError::InvalidLevel(0))));

        let beyond = f.admission.submit_upgrade(&request(f.city, "farm", 6));
        assert!(matches!(beyond, Err(IngressError::NotInCatalog { level: 6, .. })));
        assert!(f.events.is_empty().unwrap());
    }

    #[test]
    fn precheck_refuses_stale_unaffordable_and_unknown() {
        let f = fixture(10);
        let stale = f.admission.submit_upgrade(&request(f.city, "farm", 2)).unwrap_err();
        assert!(matches!(stale, IngressError::Stale { current: 2, .. }));
        assert!(stale.is_client_error());

        let poor = f.admission.submit_upgrade(&request(f.city, "farm", 3)).unwrap_err();
        assert!(matches!(poor, IngressError::Unaffordable { .. }));

        let nowhere = f
            .admission
            .submit_upgrade(&request(CityId::new(), "farm", 3))
            .unwrap_err();
        assert!(matches!(nowhere, IngressError::UnknownCity(_)));
    }

    #[test]
    fn disabled_precheck_admits_unaffordable_request() {
        let f = fixture(10);
        let admission = f.admission.with_precheck(false);
        let admitted = admission.submit_upgrade(&request(f.city, "farm", 3)).unwrap();
        assert_eq!(admitted.outcome, AddOutcome::Inserted);
    }

    #[test]
    fn city_status_reads_stored_state() {
        let f = fixture(10);
        let city = f.admission.city_status(f.city).unwrap();
        assert_eq!(city.level(BuildingKind::Farm), 2);
        assert!(matches!(
            f.admission.city_status(CityId::new()),
            Err(IngressError::UnknownCity(_))
        ));
    }

    #[test]
    fn request_deserializes_from_client_json() {
        let json = serde_json::json!({
            "cityID": "0190f3d2-6c1f-7b6e-9a4e-3c2d1b0a9f8e",
            "building": "crystal_Mine",
            "level": 2
        });
        let request: UpgradeRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.building, "crystal_Mine");
        assert_eq!(request.level, 2);
    }
}
