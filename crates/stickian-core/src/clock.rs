//! Tick counter and tick arithmetic.
//!
//! The [`TickCounter`] is the process-wide source of truth for simulated
//! time. Its value is the tick bucket currently open for admission: new
//! events are stamped with it. Only the scheduler advances it, and each
//! advance hands back the bucket that just closed so it can be processed.
//!
//! # Design Principles
//!
//! - All tick arithmetic is checked (no silent overflow).
//! - Admission holds a read guard on the counter for the whole insert, so an
//!   event can never land in a bucket after the scheduler has closed it.

use std::sync::{RwLock, RwLockReadGuard};
use std::time::Duration;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// The tick period is not usable (e.g. zero).
    #[error("invalid tick period: {reason}")]
    InvalidPeriod {
        /// Explanation of what is wrong with the period.
        reason: String,
    },

    /// The counter lock was poisoned by a panicking holder.
    #[error("tick counter lock poisoned")]
    Poisoned,
}

/// Monotonic process-wide tick counter.
#[derive(Debug, Default)]
pub struct TickCounter {
    /// Bucket open for admission.
    tick: RwLock<u64>,
}

impl TickCounter {
    /// Create a counter at tick 0.
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a counter resuming at `tick` (state restoration, tests).
    pub const fn starting_at(tick: u64) -> Self {
        Self {
            tick: RwLock::new(tick),
        }
    }

    /// The tick bucket currently open for admission.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Poisoned`] if the lock is poisoned.
    pub fn current(&self) -> Result<u64, ClockError> {
        self.tick
            .read()
            .map(|tick| *tick)
            .map_err(|_err| ClockError::Poisoned)
    }

    /// Close the open bucket and open the next one.
    ///
    /// Returns the tick that was just closed, which is the tick to process.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the counter is at
    /// `u64::MAX`, or [`ClockError::Poisoned`] if the lock is poisoned.
    pub fn advance(&self) -> Result<u64, ClockError> {
        let mut tick = self.tick.write().map_err(|_err| ClockError::Poisoned)?;
        let closed = *tick;
        *tick = closed.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(closed)
    }

    /// Pin the open bucket for the lifetime of the returned guard.
    ///
    /// The scheduler cannot advance while any guard is alive.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Poisoned`] if the lock is poisoned.
    pub fn hold(&self) -> Result<TickGuard<'_>, ClockError> {
        self.tick
            .read()
            .map(|guard| TickGuard { guard })
            .map_err(|_err| ClockError::Poisoned)
    }
}

/// Read guard pinning the open tick bucket.
#[derive(Debug)]
pub struct TickGuard<'a> {
    guard: RwLockReadGuard<'a, u64>,
}

impl TickGuard<'_> {
    /// The pinned tick.
    pub fn tick(&self) -> u64 {
        *self.guard
    }
}

/// Number of whole ticks needed to cover `duration` at `period` per tick.
///
/// Rounds up, and never returns less than 1 so a follow-up event always
/// lands in a future bucket.
///
/// # Errors
///
/// Returns [`ClockError::InvalidPeriod`] if `period` is zero, or
/// [`ClockError::TickOverflow`] if the result does not fit in a `u64`.
pub fn ticks_for(duration: Duration, period: Duration) -> Result<u64, ClockError> {
    let period_nanos = period.as_nanos();
    if period_nanos == 0 {
        return Err(ClockError::InvalidPeriod {
            reason: "tick period must be greater than zero".to_owned(),
        });
    }
    let ticks = duration.as_nanos().div_ceil(period_nanos).max(1);
    u64::try_from(ticks).map_err(|_err| ClockError::TickOverflow)
}
