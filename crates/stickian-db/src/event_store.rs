//! Pending-event storage keyed by tick bucket and idempotency key.
//!
//! The event store holds every event that has not yet been processed,
//! grouped by `scheduled_tick`. Within a bucket the event key is unique:
//! adding an event whose key is already present is reported as
//! [`AddOutcome::Duplicate`] and leaves the bucket unchanged. This is what
//! makes client retries and re-derived follow-up events harmless.
//!
//! Once the processor has durably applied an event it removes that event
//! by key, so a later pass over the same bucket only sees events whose
//! effects were never persisted.

use std::collections::BTreeMap;
use std::sync::Mutex;

use stickian_types::{Event, EventKey};

use crate::error::DbError;

/// Result of an add-if-absent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The event was new to its bucket and has been stored.
    Inserted,
    /// An event with the same key already sits in the bucket.
    Duplicate,
}

/// Storage of pending events.
///
/// Implementations must be safe to call concurrently from many admission
/// contexts while the tick processor reads.
pub trait EventStore: Send + Sync {
    /// Insert `event` into the bucket for its `scheduled_tick` unless an
    /// event with the same key is already there.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be written.
    fn add(&self, event: Event) -> Result<AddOutcome, DbError>;

    /// All events scheduled for exactly `tick`, in insertion order.
    ///
    /// An empty bucket is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read.
    fn list_for_tick(&self, tick: u64) -> Result<Vec<Event>, DbError>;

    /// Remove the event with `key` from the bucket for `tick`. Returns
    /// whether it was present.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be written.
    fn remove(&self, tick: u64, key: &EventKey) -> Result<bool, DbError>;

    /// Discard every bucket up to and including `tick`. Returns the number
    /// of events removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be written.
    fn prune_through(&self, tick: u64) -> Result<usize, DbError>;
}

/// In-memory [`EventStore`] for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    buckets: Mutex<BTreeMap<u64, Vec<Event>>>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events held across all buckets.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LockPoisoned`] if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, DbError> {
        let buckets = self
            .buckets
            .lock()
            .map_err(|_err| DbError::LockPoisoned("event store"))?;
        Ok(buckets.values().map(Vec::len).sum())
    }

    /// Whether the store holds no events.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LockPoisoned`] if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, DbError> {
        Ok(self.len()? == 0)
    }

    /// Ticks that currently hold at least one event, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LockPoisoned`] if the store lock is poisoned.
    pub fn scheduled_ticks(&self) -> Result<Vec<u64>, DbError> {
        let buckets = self
            .buckets
            .lock()
            .map_err(|_err| DbError::LockPoisoned("event store"))?;
        Ok(buckets
            .iter()
            .filter(|(_, events)| !events.is_empty())
            .map(|(tick, _)| *tick)
            .collect())
    }
}

impl EventStore for InMemoryEventStore {
    fn add(&self, event: Event) -> Result<AddOutcome, DbError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_err| DbError::LockPoisoned("event store"))?;
        let bucket = buckets.entry(event.scheduled_tick).or_default();
        if bucket.iter().any(|existing| existing.key == event.key) {
            tracing::debug!(
                key = %event.key,
                tick = event.scheduled_tick,
                "Duplicate event dropped"
            );
            return Ok(AddOutcome::Duplicate);
        }
        bucket.push(event);
        Ok(AddOutcome::Inserted)
    }

    fn list_for_tick(&self, tick: u64) -> Result<Vec<Event>, DbError> {
        let buckets = self
            .buckets
            .lock()
            .map_err(|_err| DbError::LockPoisoned("event store"))?;
        Ok(buckets.get(&tick).cloned().unwrap_or_default())
    }

    fn remove(&self, tick: u64, key: &EventKey) -> Result<bool, DbError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_err| DbError::LockPoisoned("event store"))?;
        let Some(bucket) = buckets.get_mut(&tick) else {
            return Ok(false);
        };
        let before = bucket.len();
        bucket.retain(|event| &event.key != key);
        let removed = bucket.len() < before;
        if bucket.is_empty() {
            buckets.remove(&tick);
        }
        Ok(removed)
    }

    fn prune_through(&self, tick: u64) -> Result<usize, DbError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_err| DbError::LockPoisoned("event store"))?;
        let retained = tick
            .checked_add(1)
            .map_or_else(BTreeMap::new, |first_kept| buckets.split_off(&first_kept));
        let removed = core::mem::replace(&mut *buckets, retained);
        Ok(removed.values().map(Vec::len).sum())
    }
}
