//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can stop startup or the tick
//! loop, so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: stickian_core::ConfigError,
    },

    /// The tick period or counter is unusable.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: stickian_core::ClockError,
    },

    /// The tick scheduler stopped with an error.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: stickian_core::SchedulerError,
    },

    /// A bootstrap intent could not be stored.
    #[error("bootstrap error: {source}")]
    Bootstrap {
        /// The underlying admission error.
        #[from]
        source: stickian_core::IngressError,
    },

    /// Seeding the starting city failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: stickian_db::DbError,
    },

    /// The logging subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
