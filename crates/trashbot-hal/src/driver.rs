//! Generic `ActuatorDriver` trait for the robot's motor and servo outputs.
//!
//! Drivers implement this trait and are shared (behind an `Arc`) between the
//! motion scheduler and the lid actuators.  Pin numbering and signal
//! generation stay inside the implementation.

use trashbot_types::BotError;

/// The board-level output capabilities of the robot.
///
/// Methods take `&self` because one driver instance is written concurrently
/// by the scheduler tick and by in-flight lid motions; implementations keep
/// whatever locking they need internal and short.
pub trait ActuatorDriver: Send + Sync {
    /// Stable identifier for this driver, e.g. `"sim"` or `"pca9685"`.
    fn name(&self) -> &str;

    /// Check that the hardware is reachable.  Called once at startup; a
    /// failure refuses to start the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::HardwareFault`] when the board does not answer.
    fn probe(&self) -> Result<(), BotError> {
        Ok(())
    }

    /// Drive motor `channel` at `speed`.  The sign selects the rotation
    /// direction, the magnitude the duty cycle.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::HardwareFault`] if the write cannot be applied.
    fn set_drive_signal(&self, channel: u8, speed: i32) -> Result<(), BotError>;

    /// Emit a servo pulse of `pulse_us` microseconds on `channel`.  A width
    /// of `0` switches the pulse train off.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::HardwareFault`] if the write cannot be applied.
    fn set_servo_pulse(&self, channel: u8, pulse_us: u16) -> Result<(), BotError>;
}
