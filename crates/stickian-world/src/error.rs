//! Error types for the `stickian-world` crate.

use stickian_types::{BuildingKind, ResourceKind};

/// Errors raised by catalog construction and resource accounting.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A catalog table declares a level out of sequence.
    #[error("catalog for {building} must list levels 1..=n in order, found level {level}")]
    NonContiguousLevels {
        /// The building with the malformed table.
        building: BuildingKind,
        /// The first offending level.
        level: u32,
    },

    /// A resource balance would drop below zero.
    #[error("insufficient {resource}: have {available}, need {required}")]
    InsufficientResources {
        /// The resource that ran short.
        resource: ResourceKind,
        /// Balance before the deduction.
        available: u64,
        /// Amount the cost asked for.
        required: u64,
    },

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow in world calculation")]
    ArithmeticOverflow,
}
