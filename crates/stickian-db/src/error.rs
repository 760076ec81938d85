//! Error types for the data layer.
//!
//! All store operations return [`DbError`]. The in-memory stores only fail
//! on lock poisoning or missing keys; durable backends report their
//! transport failures through [`DbError::Unavailable`].

use stickian_types::CityId;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// No state is stored for the requested city.
    #[error("city not found: {0}")]
    CityNotFound(CityId),

    /// A store's internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// The backing store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
