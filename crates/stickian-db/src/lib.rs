//! Data layer for the Stickian engine.
//!
//! The tick processor depends only on the two store traits defined here.
//! Both ship with in-memory implementations; a durable backend plugs in by
//! implementing the same traits.
//!
//! ```text
//! Admission ----add----> EventStore <--list/remove/prune-- TickProcessor
//!                                                            |
//! Status query --get---> CityStore  <-------get/put----------+
//! ```
//!
//! # Modules
//!
//! - [`event_store`] -- Pending events bucketed by tick, add-if-absent
//! - [`city_store`] -- Per-city state records
//! - [`error`] -- Shared error types

pub mod city_store;
pub mod error;
pub mod event_store;

// Re-export primary types for convenience.
pub use city_store::{CityStore, InMemoryCityStore};
pub use error::DbError;
pub use event_store::{AddOutcome, EventStore, InMemoryEventStore};
