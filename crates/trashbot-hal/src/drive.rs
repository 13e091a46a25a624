//! [`DriveController`] – discrete direction to differential drive mapping.
//!
//! Open-loop: speeds come from [`DriveConfig`], never from feedback.
//!
//! | Direction | left | right |
//! |---|---|---|
//! | `FORWARD` | `+drive_speed` | `+drive_speed` |
//! | `BACKWARD` | `-drive_speed` | `-drive_speed` |
//! | `LEFT` | `+turn_speed / 2` | `+turn_speed` |
//! | `RIGHT` | `+turn_speed` | `+turn_speed / 2` |
//! | `STOP` | `0` | `0` |
//!
//! Turns keep both wheels rolling forward with the inner wheel at half
//! speed, so the robot pivots around the inner side instead of spinning on
//! the spot.  Every value is clamped to `[-max_speed, max_speed]` before it
//! is written.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use trashbot_types::{Direction, DriveSignal};

use crate::driver::ActuatorDriver;

/// Motor channel assignment and speed constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub left_channel: u8,
    pub right_channel: u8,
    /// Symmetric saturation limit for every drive write.
    pub max_speed: i32,
    /// Magnitude used for straight driving.
    pub drive_speed: i32,
    /// Nominal turn magnitude (outer wheel); the inner wheel gets half.
    pub turn_speed: i32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            left_channel: 0,
            right_channel: 1,
            max_speed: 100,
            drive_speed: 100,
            turn_speed: 80,
        }
    }
}

/// Translates a [`Direction`] into exactly two channel writes.
pub struct DriveController {
    config: DriveConfig,
    driver: Arc<dyn ActuatorDriver>,
}

impl DriveController {
    pub fn new(config: DriveConfig, driver: Arc<dyn ActuatorDriver>) -> Self {
        Self { config, driver }
    }

    /// The clamped signal for `direction`.  Pure: depends only on the
    /// configuration.
    pub fn signal_for(&self, direction: Direction) -> DriveSignal {
        let drive = self.config.drive_speed;
        let turn = self.config.turn_speed;
        let raw = match direction {
            Direction::Forward => DriveSignal::new(drive, drive),
            Direction::Backward => DriveSignal::new(-drive, -drive),
            Direction::Left => DriveSignal::new(turn / 2, turn),
            Direction::Right => DriveSignal::new(turn, turn / 2),
            Direction::Stop => DriveSignal::STOP,
        };
        raw.clamp(self.config.max_speed)
    }

    /// Write the signal for `direction` to the left and right channels.
    ///
    /// A failed write is logged and dropped; the next call writes again.
    pub fn apply(&self, direction: Direction) -> DriveSignal {
        let signal = self.signal_for(direction);
        for (channel, speed) in [
            (self.config.left_channel, signal.left),
            (self.config.right_channel, signal.right),
        ] {
            if let Err(e) = self.driver.set_drive_signal(channel, speed) {
                warn!(channel, speed, error = %e, "drive write dropped");
            }
        }
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimDriver;

    fn controller(config: DriveConfig) -> (Arc<SimDriver>, DriveController) {
        let driver = Arc::new(SimDriver::new());
        let drive = DriveController::new(config, driver.clone());
        (driver, drive)
    }

    #[test]
    fn straight_directions_use_drive_speed() {
        let (_, drive) = controller(DriveConfig::default());
        assert_eq!(drive.signal_for(Direction::Forward), DriveSignal::new(100, 100));
        assert_eq!(drive.signal_for(Direction::Backward), DriveSignal::new(-100, -100));
        assert_eq!(drive.signal_for(Direction::Stop), DriveSignal::STOP);
    }

    #[test]
    fn turns_pivot_with_inner_wheel_at_half_speed() {
        let (_, drive) = controller(DriveConfig::default());
        assert_eq!(drive.signal_for(Direction::Left), DriveSignal::new(40, 80));
        assert_eq!(drive.signal_for(Direction::Right), DriveSignal::new(80, 40));
    }

    #[test]
    fn signals_are_clamped_to_max_speed() {
        let (driver, drive) = controller(DriveConfig {
            max_speed: 60,
            drive_speed: 100,
            turn_speed: 200,
            ..DriveConfig::default()
        });
        assert_eq!(drive.signal_for(Direction::Backward), DriveSignal::new(-60, -60));
        assert_eq!(drive.signal_for(Direction::Left), DriveSignal::new(60, 60));

        drive.apply(Direction::Forward);
        assert_eq!(driver.drive_writes(), vec![(0, 60), (1, 60)]);
    }

    #[test]
    fn apply_writes_exactly_left_then_right() {
        let (driver, drive) = controller(DriveConfig {
            left_channel: 4,
            right_channel: 7,
            ..DriveConfig::default()
        });
        let signal = drive.apply(Direction::Right);
        assert_eq!(signal, DriveSignal::new(80, 40));
        assert_eq!(driver.drive_writes(), vec![(4, 80), (7, 40)]);
    }

    #[test]
    fn apply_is_repeatable_for_every_direction() {
        let (driver, drive) = controller(DriveConfig::default());
        for d in Direction::ALL {
            driver.clear();
            drive.apply(d);
            let first = driver.drive_writes();
            driver.clear();
            drive.apply(d);
            assert_eq!(first, driver.drive_writes(), "{d} must map identically");
            assert_eq!(first.len(), 2);
        }
    }

    #[test]
    fn apply_survives_offline_driver() {
        let driver = Arc::new(SimDriver::offline());
        let drive = DriveController::new(DriveConfig::default(), driver.clone());
        assert_eq!(drive.apply(Direction::Forward), DriveSignal::new(100, 100));
        assert!(driver.writes().is_empty());
    }
}
