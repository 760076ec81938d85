//! Tick processing: the event-application pass run once per closed tick.
//!
//! For a tick `T` the [`TickProcessor`]:
//!
//! 1. **Read** -- collects every pending event from the watermark bucket
//!    through `T` (normally just `T`).
//! 2. **Order** -- sorts by `(occurred_at, kind priority, key)`, a total
//!    order independent of storage order.
//! 3. **Baseline** -- loads the stored state of every city the events
//!    touch. A failed read aborts the tick before anything is applied.
//! 4. **Apply** -- runs each event's transition against an in-memory
//!    working copy of its city. Rejected events leave the copy untouched.
//! 5. **Persist** -- writes each changed city, then that city's follow-up
//!    events. Once a city's writes all succeed, the events it consumed are
//!    removed from the store. Write failures are logged and counted; the
//!    remaining cities are still written.
//! 6. **Settle** -- if every write succeeded, the watermark moves past `T`
//!    and the processed buckets are pruned. Otherwise the watermark stays
//!    and the next pass reconsiders the events still in the store, which
//!    are only those of cities whose writes failed.
//!
//! The pass is deterministic given the same stored state and events.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stickian_db::{AddOutcome, CityStore, DbError, EventStore};
use stickian_types::{CityId, CityState, Event};
use stickian_world::Catalog;
use tracing::{debug, info, warn};

use crate::clock::ClockError;
use crate::transition::{self, Applied, Intent, Rejection, TransitionContext};

/// Errors that abort a tick before any state is written.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A pending-event bucket could not be read.
    #[error("failed to read events for tick {tick}: {source}")]
    ReadEvents {
        /// Bucket being read.
        tick: u64,
        /// The underlying store error.
        source: DbError,
    },

    /// A city's baseline state could not be read.
    #[error("failed to read city {city}: {source}")]
    ReadCity {
        /// City being read.
        city: CityId,
        /// The underlying store error.
        source: DbError,
    },
}

/// Summary of a single processed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick that was processed.
    pub tick: u64,
    /// First bucket read (the watermark at the start of the pass).
    pub from_tick: u64,
    /// Events read from the store.
    pub events_read: usize,
    /// Events whose transition applied (including re-emitted completions).
    pub applied: usize,
    /// Events rejected by their transition.
    pub rejected: usize,
    /// Events that could not be decoded or target an unknown city.
    pub invalid: usize,
    /// Follow-up events newly inserted into the store.
    pub follow_ups: usize,
    /// Writes that failed or were held back.
    pub write_failures: usize,
    /// Cities whose state was written.
    pub cities_updated: usize,
    /// Whether the watermark moved past this tick.
    pub settled: bool,
}

/// A decoded event awaiting application.
struct Pending {
    event: Event,
    intent: Intent,
}

/// Applies pending events to city state, one tick at a time.
#[derive(Debug)]
pub struct TickProcessor<E, C> {
    events: Arc<E>,
    cities: Arc<C>,
    catalog: Arc<Catalog>,
    tick_period: Duration,
    /// Oldest bucket whose effects are not yet durably written.
    watermark: AtomicU64,
}

impl<E: EventStore, C: CityStore> TickProcessor<E, C> {
    /// Create a processor starting at tick 0.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidPeriod`] if `tick_period` is zero.
    pub fn new(
        events: Arc<E>,
        cities: Arc<C>,
        catalog: Arc<Catalog>,
        tick_period: Duration,
    ) -> Result<Self, ClockError> {
        if tick_period.is_zero() {
            return Err(ClockError::InvalidPeriod {
                reason: "tick period must be greater than zero".to_owned(),
            });
        }
        Ok(Self {
            events,
            cities,
            catalog,
            tick_period,
            watermark: AtomicU64::new(0),
        })
    }

    /// Oldest tick bucket the next pass will read.
    pub fn watermark(&self) -> u64 {
        self.watermark.load(Ordering::Acquire)
    }

    /// Process the closed tick `tick`.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] if pending events or a city baseline cannot be
    /// read. Nothing is written in that case. Write failures do not produce
    /// an error; they are reported in [`TickSummary::write_failures`].
    pub fn process_tick(&self, tick: u64) -> Result<TickSummary, TickError> {
        let from_tick = self.watermark().min(tick);
        let mut summary = TickSummary {
            tick,
            from_tick,
            ..TickSummary::default()
        };

        let mut events = Vec::new();
        for bucket in from_tick..=tick {
            let batch = self
                .events
                .list_for_tick(bucket)
                .map_err(|source| TickError::ReadEvents {
                    tick: bucket,
                    source,
                })?;
            events.extend(batch);
        }
        summary.events_read = events.len();
        events.sort_by(|a, b| {
            (a.occurred_at, a.kind.priority(), a.key.as_str()).cmp(&(
                b.occurred_at,
                b.kind.priority(),
                b.key.as_str(),
            ))
        });

        let (by_city, undecodable) = group_by_city(events, &mut summary);
        let baselines = self.load_baselines(&by_city, &mut summary)?;
        let discarded = by_city
            .iter()
            .filter(|(city_id, _)| !baselines.contains_key(*city_id))
            .flat_map(|(_, pending)| pending.iter().map(|item| &item.event))
            .chain(&undecodable);
        let mut all_written = self.acknowledge(discarded, &mut summary);

        let mut next_watermark = tick.saturating_add(1);
        for (city_id, mut city) in baselines {
            let Some(pending) = by_city.get(&city_id) else {
                continue;
            };
            all_written &=
                self.process_city(city_id, &mut city, pending, &mut next_watermark, &mut summary);
        }

        if all_written {
            self.settle(tick, next_watermark);
            summary.settled = next_watermark > tick;
        }

        info!(
            tick,
            from_tick,
            events = summary.events_read,
            applied = summary.applied,
            rejected = summary.rejected,
            invalid = summary.invalid,
            follow_ups = summary.follow_ups,
            write_failures = summary.write_failures,
            cities = summary.cities_updated,
            settled = summary.settled,
            "Tick processed"
        );
        Ok(summary)
    }

    /// Read the stored state of every city with pending events.
    ///
    /// Cities that do not exist are dropped (their events count as
    /// invalid); any other read failure aborts the tick.
    fn load_baselines(
        &self,
        by_city: &BTreeMap<CityId, Vec<Pending>>,
        summary: &mut TickSummary,
    ) -> Result<BTreeMap<CityId, CityState>, TickError> {
        let mut baselines = BTreeMap::new();
        for (&city_id, pending) in by_city {
            match self.cities.get(city_id) {
                Ok(city) => {
                    baselines.insert(city_id, city);
                }
                Err(DbError::CityNotFound(_)) => {
                    warn!(
                        tick = summary.tick,
                        city = %city_id,
                        events = pending.len(),
                        "Events for unknown city skipped"
                    );
                    summary.invalid = summary.invalid.saturating_add(pending.len());
                }
                Err(source) => {
                    return Err(TickError::ReadCity {
                        city: city_id,
                        source,
                    });
                }
            }
        }
        Ok(baselines)
    }

    /// Apply one city's events, then persist the city and its follow-ups.
    ///
    /// Returns whether every write for the city succeeded. Only then are the
    /// city's events removed from the store.
    fn process_city(
        &self,
        city_id: CityId,
        city: &mut CityState,
        pending: &[Pending],
        next_watermark: &mut u64,
        summary: &mut TickSummary,
    ) -> bool {
        let tick = summary.tick;
        let ctx = TransitionContext {
            tick,
            tick_period: self.tick_period,
            catalog: &self.catalog,
        };
        let mut changed = false;
        let mut follow_ups = Vec::new();
        for item in pending {
            match transition::apply(city, &item.intent, item.event.occurred_at, &ctx) {
                Ok(applied) => {
                    summary.applied = summary.applied.saturating_add(1);
                    log_applied(&item.event, &applied);
                    changed |= !matches!(applied, Applied::Reemitted { .. });
                    if let Some(follow_up) = applied.into_follow_up() {
                        follow_ups.push(follow_up);
                    }
                }
                Err(rejection) => {
                    summary.rejected = summary.rejected.saturating_add(1);
                    log_rejection(&item.event, &rejection);
                }
            }
        }

        if changed {
            if let Err(err) = self.cities.put(city_id, city) {
                warn!(tick, city = %city_id, error = %err, "City write failed");
                summary.write_failures = summary
                    .write_failures
                    .saturating_add(1)
                    .saturating_add(follow_ups.len());
                return false;
            }
            summary.cities_updated = summary.cities_updated.saturating_add(1);
        }

        let mut written = true;
        for follow_up in follow_ups {
            let follow_up_tick = follow_up.scheduled_tick;
            let key = follow_up.key.clone();
            match self.events.add(follow_up) {
                Ok(AddOutcome::Inserted) => {
                    debug!(tick, key = %key, follow_up_tick, "Follow-up written");
                    summary.follow_ups = summary.follow_ups.saturating_add(1);
                    // Landed in a bucket this pass has already read.
                    if follow_up_tick <= tick {
                        *next_watermark = (*next_watermark).min(follow_up_tick);
                    }
                }
                Ok(AddOutcome::Duplicate) => {
                    debug!(tick, key = %key, follow_up_tick, "Follow-up already pending");
                }
                Err(err) => {
                    warn!(tick, key = %key, error = %err, "Follow-up write failed");
                    written = false;
                    summary.write_failures = summary.write_failures.saturating_add(1);
                }
            }
        }

        written && self.acknowledge(pending.iter().map(|item| &item.event), summary)
    }

    /// Remove events whose effects are fully persisted or that were
    /// discarded. Returns whether every removal succeeded.
    fn acknowledge<'a>(
        &self,
        consumed: impl IntoIterator<Item = &'a Event>,
        summary: &mut TickSummary,
    ) -> bool {
        let mut removed_all = true;
        for event in consumed {
            if let Err(err) = self.events.remove(event.scheduled_tick, &event.key) {
                warn!(
                    tick = summary.tick,
                    key = %event.key,
                    error = %err,
                    "Event removal failed"
                );
                removed_all = false;
                summary.write_failures = summary.write_failures.saturating_add(1);
            }
        }
        removed_all
    }

    /// Advance the watermark to `next` and prune the buckets behind it.
    fn settle(&self, tick: u64, next: u64) {
        self.watermark.fetch_max(next, Ordering::AcqRel);
        let Some(through) = next.checked_sub(1) else {
            return;
        };
        match self.events.prune_through(through) {
            Ok(removed) => debug!(tick, through, removed, "Processed buckets pruned"),
            Err(err) => warn!(tick, through, error = %err, "Bucket pruning failed"),
        }
    }
}

/// Decode events and group them by city, preserving sorted order.
///
/// Events that cannot be decoded are returned separately.
fn group_by_city(
    events: Vec<Event>,
    summary: &mut TickSummary,
) -> (BTreeMap<CityId, Vec<Pending>>, Vec<Event>) {
    let mut by_city: BTreeMap<CityId, Vec<Pending>> = BTreeMap::new();
    let mut undecodable = Vec::new();
    for event in events {
        match Intent::decode(&event) {
            Ok(intent) => by_city
                .entry(intent.city_id())
                .or_default()
                .push(Pending { event, intent }),
            Err(err) => {
                warn!(
                    tick = summary.tick,
                    key = %event.key,
                    kind = %event.kind,
                    error = %err,
                    "Undecodable event skipped"
                );
                summary.invalid = summary.invalid.saturating_add(1);
                undecodable.push(event);
            }
        }
    }
    (by_city, undecodable)
}

fn log_applied(event: &Event, applied: &Applied) {
    match applied {
        Applied::Queued { follow_up } => info!(
            key = %event.key,
            complete_tick = follow_up.scheduled_tick,
            "Upgrade accepted"
        ),
        Applied::Reemitted { follow_up } => debug!(
            key = %event.key,
            complete_tick = follow_up.scheduled_tick,
            "Completion re-emitted for queued upgrade"
        ),
        Applied::Completed => info!(key = %event.key, "Upgrade completed"),
    }
}

fn log_rejection(event: &Event, rejection: &Rejection) {
    match rejection {
        Rejection::AlreadyApplied { .. } => {
            debug!(key = %event.key, reason = %rejection, "Stale event discarded");
        }
        Rejection::LevelMismatch { .. }
        | Rejection::UpgradeInProgress { .. }
        | Rejection::InsufficientResources { .. } => {
            info!(key = %event.key, reason = %rejection, "Event rejected");
        }
        Rejection::NotInCatalog { .. }
        | Rejection::Unschedulable { .. }
        | Rejection::Encoding(_) => {
            warn!(key = %event.key, reason = %rejection, "Invalid event rejected");
        }
    }
}
