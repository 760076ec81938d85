//! Tick scheduling, event application, and admission for the Stickian engine.
//!
//! Requests enter through [`Admission`], which stamps them with the open
//! tick and appends them to the event store. The [`TickScheduler`] closes
//! one tick per period and hands it to the [`TickProcessor`], which applies
//! that tick's events to city state and schedules follow-up events.
//!
//! # Modules
//!
//! - [`clock`] -- Process-wide tick counter and tick arithmetic.
//! - [`config`] -- Configuration loading from `stickian-config.yaml` into
//!   strongly-typed structs.
//! - [`ingress`] -- Request validation and event admission.
//! - [`scheduler`] -- Periodic clock, catch-up queue, and worker loop.
//! - [`shutdown`] -- Cooperative shutdown signal.
//! - [`tick`] -- The per-tick event-application pass.
//! - [`transition`] -- Pure per-kind state transitions.

pub mod clock;
pub mod config;
pub mod ingress;
pub mod scheduler;
pub mod shutdown;
pub mod tick;
pub mod transition;

pub use clock::{ClockError, TickCounter, ticks_for};
pub use config::{ConfigError, EngineConfig};
pub use ingress::{Admission, Admitted, IngressError, UpgradeRequest};
pub use scheduler::{SchedulerError, SchedulerReport, TickHandler, TickScheduler};
pub use shutdown::ShutdownSignal;
pub use tick::{TickError, TickProcessor, TickSummary};
pub use transition::{Applied, Intent, Rejection};
