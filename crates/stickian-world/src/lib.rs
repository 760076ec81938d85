//! Static game data and resource accounting for the Stickian engine.
//!
//! # Modules
//!
//! - [`catalog`] -- [`Catalog`] of upgrade costs and durations, indexed by
//!   building and target level.
//! - [`error`] -- Error types for catalog construction and accounting.
//! - [`resource`] -- Affordability checks and checked cost deduction.
//! - [`starting_city`] -- Seed state for a new city.

pub mod catalog;
pub mod error;
pub mod resource;
pub mod starting_city;

// Re-export primary types at crate root.
pub use catalog::{Catalog, ResourceCost, UpgradeSpec};
pub use error::WorldError;
pub use resource::{deduct, has_sufficient};
pub use starting_city::{STARTING_CITY_NAME, starting_city};
