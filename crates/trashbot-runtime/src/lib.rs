//! `trashbot-runtime` – the robot's clock and its observability plumbing.
//!
//! # Modules
//!
//! - [`scheduler`] – [`MotionScheduler`][scheduler::MotionScheduler]: holds
//!   the single commanded [`Direction`][trashbot_types::Direction] in an
//!   atomic register and re-asserts the matching drive signal on a fixed
//!   period, so the robot keeps moving without a message per tick and halts
//!   within one tick once told to stop.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod scheduler;
pub mod telemetry;

pub use scheduler::{MotionScheduler, SchedulerConfig};
pub use telemetry::{TelemetryGuard, init_tracing};
