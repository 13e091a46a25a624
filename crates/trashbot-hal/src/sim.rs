//! In-process simulated driver for tests and runs without the robot board.
//!
//! [`SimDriver`] accepts every write, logs it at `debug` level and keeps a
//! timestamped journal so tests can assert on exactly what reached the
//! "hardware".
//!
//! # Example
//!
//! ```rust
//! use trashbot_hal::{ActuatorDriver, SimDriver};
//!
//! let driver = SimDriver::new();
//! driver.set_drive_signal(0, 100).unwrap();
//! assert_eq!(driver.drive_writes(), vec![(0, 100)]);
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::Instant;
use tracing::debug;
use trashbot_types::BotError;

use crate::driver::ActuatorDriver;

/// One primitive write recorded by [`SimDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverWrite {
    Drive { channel: u8, speed: i32, at: Instant },
    Servo { channel: u8, pulse_us: u16, at: Instant },
}

impl DriverWrite {
    pub fn at(&self) -> Instant {
        match self {
            DriverWrite::Drive { at, .. } | DriverWrite::Servo { at, .. } => *at,
        }
    }
}

/// A simulated actuator driver that records every write.  Always succeeds
/// unless switched offline with [`SimDriver::offline`].
#[derive(Debug, Default)]
pub struct SimDriver {
    journal: Mutex<Vec<DriverWrite>>,
    offline: AtomicBool,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver whose board "does not answer": `probe` and every write fail.
    pub fn offline() -> Self {
        let driver = Self::default();
        driver.offline.store(true, Ordering::SeqCst);
        driver
    }

    /// Every write so far, oldest first.
    pub fn writes(&self) -> Vec<DriverWrite> {
        self.lock().clone()
    }

    /// `(channel, speed)` of every drive write, oldest first.
    pub fn drive_writes(&self) -> Vec<(u8, i32)> {
        self.lock()
            .iter()
            .filter_map(|w| match *w {
                DriverWrite::Drive { channel, speed, .. } => Some((channel, speed)),
                DriverWrite::Servo { .. } => None,
            })
            .collect()
    }

    /// `(channel, pulse_us)` of every servo write, oldest first.
    pub fn servo_writes(&self) -> Vec<(u8, u16)> {
        self.lock()
            .iter()
            .filter_map(|w| match *w {
                DriverWrite::Servo {
                    channel, pulse_us, ..
                } => Some((channel, pulse_us)),
                DriverWrite::Drive { .. } => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DriverWrite>> {
        self.journal.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self, component: String) -> Result<(), BotError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BotError::HardwareFault {
                component,
                details: "simulated board is offline".to_string(),
            });
        }
        Ok(())
    }
}

impl ActuatorDriver for SimDriver {
    fn name(&self) -> &str {
        "sim"
    }

    fn probe(&self) -> Result<(), BotError> {
        self.check_online("sim".to_string())
    }

    fn set_drive_signal(&self, channel: u8, speed: i32) -> Result<(), BotError> {
        self.check_online(format!("drive_{channel}"))?;
        debug!(channel, speed, "sim drive signal");
        self.lock().push(DriverWrite::Drive {
            channel,
            speed,
            at: Instant::now(),
        });
        Ok(())
    }

    fn set_servo_pulse(&self, channel: u8, pulse_us: u16) -> Result<(), BotError> {
        self.check_online(format!("servo_{channel}"))?;
        debug!(channel, pulse_us, "sim servo pulse");
        self.lock().push(DriverWrite::Servo {
            channel,
            pulse_us,
            at: Instant::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_driver_records_writes_in_order() {
        let driver = SimDriver::new();
        driver.set_drive_signal(0, 50).unwrap();
        driver.set_servo_pulse(3, 1166).unwrap();
        driver.set_drive_signal(1, -50).unwrap();

        assert_eq!(driver.writes().len(), 3);
        assert_eq!(driver.drive_writes(), vec![(0, 50), (1, -50)]);
        assert_eq!(driver.servo_writes(), vec![(3, 1166)]);
    }

    #[test]
    fn sim_driver_clear_empties_journal() {
        let driver = SimDriver::new();
        driver.set_drive_signal(0, 10).unwrap();
        driver.clear();
        assert!(driver.writes().is_empty());
    }

    #[test]
    fn offline_sim_driver_fails_probe_and_writes() {
        let driver = SimDriver::offline();
        assert!(matches!(driver.probe(), Err(BotError::HardwareFault { .. })));
        let err = driver.set_servo_pulse(2, 500).unwrap_err();
        assert!(err.to_string().contains("servo_2"));
        assert!(driver.writes().is_empty());
    }

    #[test]
    fn online_sim_driver_probe_succeeds() {
        assert!(SimDriver::new().probe().is_ok());
        assert_eq!(SimDriver::new().name(), "sim");
    }
}
