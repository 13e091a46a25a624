//! `trashbot-hal` – Hardware Abstraction Layer
//!
//! Everything that turns a decision into a pulse on a wire lives here.  The
//! rest of the workspace only talks to the [`ActuatorDriver`] trait, so the
//! simulated driver used in tests and the real board driver are
//! interchangeable.
//!
//! # Modules
//!
//! - [`driver`] – [`ActuatorDriver`]: the two primitive capabilities the
//!   robot hardware exposes (drive signal per motor channel, servo pulse per
//!   servo channel).
//! - [`sim`] – [`SimDriver`]: an in-process driver that records every write
//!   for assertions and headless runs.
//! - [`drive`] – [`DriveController`]: maps a [`Direction`] onto a
//!   differential (left, right) drive signal.
//! - [`lid`] – [`LidActuator`] / [`LidBank`]: timed, open-loop lid motions
//!   guarded by a per-lid busy state.
//!
//! [`Direction`]: trashbot_types::Direction

pub mod drive;
pub mod driver;
pub mod lid;
pub mod sim;

pub use drive::{DriveConfig, DriveController};
pub use driver::ActuatorDriver;
pub use lid::{LidActuator, LidBank, LidMotion, NEUTRAL_PULSE_US};
pub use sim::{DriverWrite, SimDriver};
