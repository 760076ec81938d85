//! Shared type definitions for the Stickian city-building engine.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace. City-facing types flow to `TypeScript` via `ts-rs` for the
//! web client.
//!
//! # Modules
//!
//! - [`ids`] -- City identifiers and event idempotency keys
//! - [`enums`] -- Building, resource, and event kinds
//! - [`structs`] -- Events, upgrade payloads, and city state

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{BuildingKind, EventKind, ParseKindError, ResourceKind};
pub use ids::{CityId, EventKey};
pub use structs::{CityState, Event, UpgradePayload, UpgradeQueueItem};
