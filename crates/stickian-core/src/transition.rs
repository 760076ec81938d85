//! Per-kind state transitions.
//!
//! Each event kind has one transition function taking the working copy of a
//! city and the decoded payload. A transition either applies (mutating the
//! city and possibly producing a follow-up event) or rejects, in which case
//! the city is left exactly as it was. Transitions never touch a store, so
//! they are tested here in isolation.
//!
//! Transitions are idempotent under re-delivery: replaying an already
//! applied completion is a stale no-op, and replaying an accepted request
//! re-emits the identical completion event without charging again.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use stickian_types::{
    BuildingKind, CityId, CityState, Event, EventKind, ResourceKind, UpgradePayload,
    UpgradeQueueItem,
};
use stickian_world::{Catalog, WorldError};

use crate::clock;

/// Inputs shared by every transition in a tick.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    /// Tick being processed.
    pub tick: u64,
    /// Real-time length of one tick.
    pub tick_period: Duration,
    /// Upgrade cost and duration table.
    pub catalog: &'a Catalog,
}

/// A decoded event body, dispatched by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// A client asked to upgrade a building.
    UpgradeRequested(UpgradePayload),
    /// A queued upgrade reached its completion time.
    UpgradeCompleted(UpgradePayload),
}

impl Intent {
    /// Decode the payload of `event` according to its kind.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownKind`] for kinds this engine does not
    /// handle, or [`DecodeError::Malformed`] if the payload does not match
    /// the kind's schema.
    pub fn decode(event: &Event) -> Result<Self, DecodeError> {
        let payload = || {
            serde_json::from_value::<UpgradePayload>(event.payload.clone()).map_err(|source| {
                DecodeError::Malformed {
                    kind: event.kind,
                    source,
                }
            })
        };
        match event.kind {
            EventKind::UpgradeRequested => payload().map(Self::UpgradeRequested),
            EventKind::UpgradeCompleted => payload().map(Self::UpgradeCompleted),
            EventKind::Unknown(code) => Err(DecodeError::UnknownKind(code)),
        }
    }

    /// The city this intent targets.
    pub const fn city_id(&self) -> CityId {
        match self {
            Self::UpgradeRequested(payload) | Self::UpgradeCompleted(payload) => payload.city_id,
        }
    }
}

/// An event that could not be turned into an [`Intent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The kind code is not handled by this engine.
    #[error("unknown event kind {0}")]
    UnknownKind(u16),

    /// The payload does not match the kind's schema.
    #[error("malformed {kind} payload: {source}")]
    Malformed {
        /// Kind whose schema was expected.
        kind: EventKind,
        /// The underlying decode error.
        source: serde_json::Error,
    },
}

/// A successfully applied transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Request accepted: cost deducted, upgrade queued.
    Queued {
        /// Completion event to schedule.
        follow_up: Event,
    },
    /// Request already accepted earlier: its completion is emitted again.
    Reemitted {
        /// The same completion event the original acceptance produced.
        follow_up: Event,
    },
    /// Completion applied: level raised, queue entry removed.
    Completed,
}

impl Applied {
    /// The follow-up event to persist, if any.
    pub fn into_follow_up(self) -> Option<Event> {
        match self {
            Self::Queued { follow_up } | Self::Reemitted { follow_up } => Some(follow_up),
            Self::Completed => None,
        }
    }
}

/// Why a transition did not apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The building is already at or above the target level.
    #[error("{building} already at level {current}, target {target}")]
    AlreadyApplied {
        /// Building named by the event.
        building: BuildingKind,
        /// Level in the live state.
        current: u32,
        /// Level named by the event.
        target: u32,
    },

    /// The target is not exactly one above the live level.
    #[error("{building} is at level {current}, cannot move to {target}")]
    LevelMismatch {
        /// Building named by the event.
        building: BuildingKind,
        /// Level in the live state.
        current: u32,
        /// Level named by the event.
        target: u32,
    },

    /// Another upgrade of the same building is still queued.
    #[error("{building} upgrade to level {queued} already in progress")]
    UpgradeInProgress {
        /// Building named by the event.
        building: BuildingKind,
        /// Level of the queued upgrade.
        queued: u32,
    },

    /// The catalog has no entry for the upgrade.
    #[error("{building} level {level} is not in the catalog")]
    NotInCatalog {
        /// Building named by the event.
        building: BuildingKind,
        /// Level named by the event.
        level: u32,
    },

    /// The city cannot pay the catalog cost.
    #[error("{building} level {level} needs {required} {resource}, city has {available}")]
    InsufficientResources {
        /// Building named by the event.
        building: BuildingKind,
        /// Level named by the event.
        level: u32,
        /// First resource found short.
        resource: ResourceKind,
        /// Balance of that resource.
        available: u64,
        /// Cost in that resource.
        required: u64,
    },

    /// The completion tick or time is out of range.
    #[error("completion of {building} level {level} cannot be scheduled")]
    Unschedulable {
        /// Building named by the event.
        building: BuildingKind,
        /// Level named by the event.
        level: u32,
    },

    /// The follow-up event could not be encoded.
    #[error("follow-up encoding failed: {0}")]
    Encoding(String),
}

impl Rejection {
    /// Whether the event merely repeats something the state already
    /// reflects. Stale rejections are expected under client retries.
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::AlreadyApplied { .. })
    }
}

/// Apply `intent` to the working copy `city`.
///
/// `occurred_at` is the event's server timestamp.
///
/// # Errors
///
/// Returns the [`Rejection`] describing why the event was discarded; `city`
/// is unchanged in that case.
pub fn apply(
    city: &mut CityState,
    intent: &Intent,
    occurred_at: DateTime<Utc>,
    ctx: &TransitionContext<'_>,
) -> Result<Applied, Rejection> {
    match intent {
        Intent::UpgradeRequested(payload) => upgrade_requested(city, payload, occurred_at, ctx),
        Intent::UpgradeCompleted(payload) => upgrade_completed(city, payload),
    }
}

/// Accept or reject a building upgrade request.
///
/// # Errors
///
/// Returns a [`Rejection`] if the request no longer matches the live
/// state, is not in the catalog, or cannot be paid for.
pub fn upgrade_requested(
    city: &mut CityState,
    payload: &UpgradePayload,
    occurred_at: DateTime<Utc>,
    ctx: &TransitionContext<'_>,
) -> Result<Applied, Rejection> {
    let building = payload.building;
    let target = payload.level;
    let current = city.level(building);

    if current >= target {
        return Err(Rejection::AlreadyApplied {
            building,
            current,
            target,
        });
    }

    if let Some(item) = city.queued(building, target) {
        let follow_up = Event::upgrade_completed(payload, item.complete_tick, item.complete_time)
            .map_err(|err| Rejection::Encoding(err.to_string()))?;
        return Ok(Applied::Reemitted { follow_up });
    }

    if let Some(item) = city.upgrade_queue.iter().find(|item| item.building == building) {
        return Err(Rejection::UpgradeInProgress {
            building,
            queued: item.level,
        });
    }

    if current.checked_add(1) != Some(target) {
        return Err(Rejection::LevelMismatch {
            building,
            current,
            target,
        });
    }

    let spec = ctx
        .catalog
        .spec(building, target)
        .ok_or(Rejection::NotInCatalog {
            building,
            level: target,
        })?;

    let unschedulable = || Rejection::Unschedulable {
        building,
        level: target,
    };
    let ticks = clock::ticks_for(spec.duration, ctx.tick_period).map_err(|_err| unschedulable())?;
    let complete_tick = ctx.tick.checked_add(ticks).ok_or_else(unschedulable)?;
    let build_time = TimeDelta::from_std(spec.duration).map_err(|_err| unschedulable())?;
    let complete_time = occurred_at
        .checked_add_signed(build_time)
        .ok_or_else(unschedulable)?;

    let follow_up = Event::upgrade_completed(payload, complete_tick, complete_time)
        .map_err(|err| Rejection::Encoding(err.to_string()))?;

    stickian_world::deduct(&mut city.resources, &spec.cost).map_err(|err| match err {
        WorldError::InsufficientResources {
            resource,
            available,
            required,
        } => Rejection::InsufficientResources {
            building,
            level: target,
            resource,
            available,
            required,
        },
        WorldError::NonContiguousLevels { .. } | WorldError::ArithmeticOverflow => {
            unschedulable()
        }
    })?;

    city.upgrade_queue.push(UpgradeQueueItem {
        building,
        level: target,
        complete_time,
        complete_tick,
    });

    Ok(Applied::Queued { follow_up })
}

/// Apply or reject the completion of a queued upgrade.
///
/// # Errors
///
/// Returns [`Rejection::AlreadyApplied`] on re-delivery, or
/// [`Rejection::LevelMismatch`] if the live level is not one below the
/// target.
pub fn upgrade_completed(
    city: &mut CityState,
    payload: &UpgradePayload,
) -> Result<Applied, Rejection> {
    let building = payload.building;
    let target = payload.level;
    let current = city.level(building);

    if current >= target {
        return Err(Rejection::AlreadyApplied {
            building,
            current,
            target,
        });
    }
    if current.checked_add(1) != Some(target) {
        return Err(Rejection::LevelMismatch {
            building,
            current,
            target,
        });
    }

    city.buildings.insert(building, target);
    city.upgrade_queue
        .retain(|item| !(item.building == building && item.level == target));
    Ok(Applied::Completed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use stickian_world::UpgradeSpec;

    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_specs([
            (
                BuildingKind::Farm,
                1,
                UpgradeSpec {
                    cost: BTreeMap::from([(ResourceKind::Stone, 10)]),
                    duration: Duration::from_secs(1),
                },
            ),
            (
                BuildingKind::Farm,
                2,
                UpgradeSpec {
                    cost: BTreeMap::from([(ResourceKind::Stone, 20)]),
                    duration: Duration::from_secs(2),
                },
            ),
            (
                BuildingKind::Farm,
                3,
                UpgradeSpec {
                    cost: BTreeMap::from([(ResourceKind::Stone, 200)]),
                    duration: Duration::from_millis(4500),
                },
            ),
        ])
        .unwrap()
    }

    fn city(farm: u32, stone: u64) -> CityState {
        let mut city = CityState::new(CityId::new(), "Test");
        city.buildings.insert(BuildingKind::Farm, farm);
        city.resources.insert(ResourceKind::Stone, stone);
        city
    }

    fn farm(city: &CityState, level: u32) -> UpgradePayload {
        UpgradePayload {
            city_id: city.id,
            building: BuildingKind::Farm,
            level,
        }
    }

    fn ctx(catalog: &Catalog, tick: u64) -> TransitionContext<'_> {
        TransitionContext {
            tick,
            tick_period: Duration::from_secs(1),
            catalog,
        }
    }

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn request_deducts_exact_cost_and_queues() {
        let catalog = catalog();
        let mut city = city(2, 250);
        let payload = farm(&city, 3);

        let applied = upgrade_requested(&mut city, &payload, at(), &ctx(&catalog, 10)).unwrap();

        assert_eq!(city.balance(ResourceKind::Stone), 50);
        assert_eq!(city.upgrade_queue.len(), 1);
        let item = city.upgrade_queue.first().copied().unwrap();
        // 4.5s at 1s per tick rounds up to 5 ticks.
        assert_eq!(item.complete_tick, 15);
        assert_eq!(item.complete_time, at() + TimeDelta::milliseconds(4500));

        assert!(matches!(applied, Applied::Queued { .. }));
        let follow_up = applied.into_follow_up().unwrap();
        assert_eq!(follow_up.kind, EventKind::UpgradeCompleted);
        assert_eq!(follow_up.scheduled_tick, 15);
        assert_eq!(follow_up.occurred_at, item.complete_time);
        assert_eq!(follow_up.key, payload.completion_key());
    }

    #[test]
    fn insufficient_resources_leave_city_untouched() {
        let catalog = catalog();
        let mut city = city(2, 50);
        let before = city.clone();
        let payload = farm(&before, 3);

        let rejection = upgrade_requested(&mut city, &payload, at(), &ctx(&catalog, 0));

        assert!(matches!(
            rejection,
            Err(Rejection::InsufficientResources {
                resource: ResourceKind::Stone,
                available: 50,
                required: 200,
                ..
            })
        ));
        assert_eq!(city, before);
    }

    #[test]
    fn request_for_current_level_is_stale() {
        let catalog = catalog();
        let mut city = city(3, 1000);
        let payload = farm(&city, 3);
        let rejection =
            upgrade_requested(&mut city, &payload, at(), &ctx(&catalog, 0)).unwrap_err();
        assert!(rejection.is_stale());
    }

    #[test]
    fn request_skipping_a_level_is_rejected() {
        let catalog = catalog();
        let mut city = city(1, 1000);
        let payload = farm(&city, 3);
        assert!(matches!(
            upgrade_requested(&mut city, &payload, at(), &ctx(&catalog, 0)),
            Err(Rejection::LevelMismatch {
                current: 1,
                target: 3,
                ..
            })
        ));
    }

    #[test]
    fn request_beyond_catalog_is_rejected() {
        let catalog = catalog();
        let mut city = city(3, 1000);
        let payload = farm(&city, 4);
        assert!(matches!(
            upgrade_requested(&mut city, &payload, at(), &ctx(&catalog, 0)),
            Err(Rejection::NotInCatalog { level: 4, .. })
        ));
    }

    #[test]
    fn replayed_request_reemits_same_completion_without_charging() {
        let catalog = catalog();
        let mut city = city(2, 400);
        let payload = farm(&city, 3);

        let first = upgrade_requested(&mut city, &payload, at(), &ctx(&catalog, 10))
            .unwrap()
            .into_follow_up()
            .unwrap();
        // Re-delivered two ticks later with a later timestamp.
        let later = at() + TimeDelta::seconds(2);
        let second = upgrade_requested(&mut city, &payload, later, &ctx(&catalog, 12)).unwrap();

        assert!(matches!(second, Applied::Reemitted { .. }));
        assert_eq!(second.into_follow_up().unwrap(), first);
        assert_eq!(city.balance(ResourceKind::Stone), 200);
        assert_eq!(city.upgrade_queue.len(), 1);
    }

    #[test]
    fn second_level_while_queued_is_rejected() {
        let catalog = catalog();
        let mut city = city(1, 1000);
        let (two, three) = (farm(&city, 2), farm(&city, 3));
        upgrade_requested(&mut city, &two, at(), &ctx(&catalog, 0)).unwrap();
        let rejection = upgrade_requested(&mut city, &three, at(), &ctx(&catalog, 0));
        assert!(matches!(
            rejection,
            Err(Rejection::UpgradeInProgress { queued: 2, .. })
        ));
    }

    #[test]
    fn completion_raises_level_and_clears_queue() {
        let catalog = catalog();
        let mut city = city(2, 200);
        let payload = farm(&city, 3);
        upgrade_requested(&mut city, &payload, at(), &ctx(&catalog, 0)).unwrap();

        let applied = upgrade_completed(&mut city, &payload).unwrap();

        assert_eq!(applied, Applied::Completed);
        assert_eq!(city.level(BuildingKind::Farm), 3);
        assert!(city.upgrade_queue.is_empty());
        assert_eq!(city.balance(ResourceKind::Stone), 0);
    }

    #[test]
    fn completion_is_idempotent() {
        let mut city = city(2, 0);
        let payload = farm(&city, 3);
        upgrade_completed(&mut city, &payload).unwrap();
        let after_first = city.clone();

        let second = upgrade_completed(&mut city, &payload).unwrap_err();

        assert!(second.is_stale());
        assert_eq!(city, after_first);
    }

    #[test]
    fn completion_out_of_sequence_is_rejected() {
        let mut city = city(1, 0);
        let payload = farm(&city, 3);
        assert!(matches!(
            upgrade_completed(&mut city, &payload),
            Err(Rejection::LevelMismatch { .. })
        ));
        assert_eq!(city.level(BuildingKind::Farm), 1);
    }

    #[test]
    fn decode_dispatches_by_kind() {
        let city = city(2, 0);
        let payload = farm(&city, 3);
        let request = Event::upgrade_requested(&payload, 0, at()).unwrap();
        assert_eq!(
            Intent::decode(&request).unwrap(),
            Intent::UpgradeRequested(payload)
        );
        assert_eq!(Intent::decode(&request).unwrap().city_id(), city.id);
    }

    #[test]
    fn decode_rejects_unknown_and_malformed() {
        let city = city(2, 0);
        let mut event = Event::upgrade_requested(&farm(&city, 3), 0, at()).unwrap();

        event.kind = EventKind::Unknown(9);
        assert!(matches!(Intent::decode(&event), Err(DecodeError::UnknownKind(9))));

        event.kind = EventKind::UpgradeRequested;
        event.payload = serde_json::json!({ "building": "farm" });
        assert!(matches!(Intent::decode(&event), Err(DecodeError::Malformed { .. })));
    }
}
