//! [`MotionScheduler`] – periodic re-assertion of the commanded direction.
//!
//! Intent and actuation are decoupled: [`MotionScheduler::set_direction`]
//! only stores the new direction, and the tick loop started with
//! [`MotionScheduler::run`] reads it every period and writes the matching
//! drive signal.  The register is a plain `AtomicU8`, so a tick never waits
//! on message handling and a writer never waits on a tick.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trashbot_hal::{DriveConfig, DriveController, SimDriver};
//! use trashbot_runtime::{MotionScheduler, SchedulerConfig};
//! use trashbot_types::Direction;
//!
//! #[tokio::main]
//! async fn main() {
//!     let drive = DriveController::new(DriveConfig::default(), Arc::new(SimDriver::new()));
//!     let scheduler = Arc::new(MotionScheduler::new(&SchedulerConfig::default(), drive));
//!     let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//!
//!     tokio::spawn(Arc::clone(&scheduler).run(stop_rx));
//!     scheduler.set_direction(Direction::Forward);
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use trashbot_hal::DriveController;
use trashbot_types::{Direction, DriveSignal};

/// Tick timing of the motion loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_period_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_period_ms: 50 }
    }
}

impl SchedulerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

/// Owner of the current [`Direction`] and of the drive tick.
pub struct MotionScheduler {
    direction: AtomicU8,
    ticks: AtomicU64,
    period: Duration,
    drive: DriveController,
}

impl MotionScheduler {
    /// A scheduler that starts out stopped.
    pub fn new(config: &SchedulerConfig, drive: DriveController) -> Self {
        Self {
            direction: AtomicU8::new(Direction::Stop as u8),
            ticks: AtomicU64::new(0),
            period: config.period(),
            drive,
        }
    }

    /// The direction the next tick will assert.
    pub fn direction(&self) -> Direction {
        Direction::from_u8(self.direction.load(Ordering::SeqCst))
    }

    /// Overwrite the commanded direction.  Takes effect on the next tick.
    pub fn set_direction(&self, direction: Direction) {
        let previous = Direction::from_u8(self.direction.swap(direction as u8, Ordering::SeqCst));
        if previous != direction {
            debug!(from = %previous, to = %direction, "direction changed");
        }
    }

    pub fn stop(&self) {
        self.set_direction(Direction::Stop);
    }

    /// Force [`Direction::Stop`] after a connection loss.
    ///
    /// Returns the direction that was in effect.
    pub fn force_stop(&self, reason: &str) -> Direction {
        let previous = Direction::from_u8(self.direction.swap(Direction::Stop as u8, Ordering::SeqCst));
        if previous == Direction::Stop {
            debug!(reason, "force stop while already stopped");
        } else {
            warn!(reason, was = %previous, "forcing STOP");
        }
        previous
    }

    /// Number of ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Execute one tick: read the register and write the drive signal.
    pub fn tick(&self) -> DriveSignal {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        self.drive.apply(self.direction())
    }

    /// Tick every configured period until `shutdown` flips to `true`
    /// (or its sender is dropped), then stop the motors one last time.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        info!(period_ms = self.period.as_millis() as u64, "motion scheduler started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.stop();
        self.tick();
        info!(ticks = self.ticks(), "motion scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trashbot_hal::{DriveConfig, DriverWrite, LidBank, LidMotion, SimDriver};
    use trashbot_types::{LidId, LidSpec};

    fn scheduler(period_ms: u64) -> (Arc<SimDriver>, Arc<MotionScheduler>) {
        let driver = Arc::new(SimDriver::new());
        let drive = DriveController::new(DriveConfig::default(), driver.clone());
        let config = SchedulerConfig {
            tick_period_ms: period_ms,
        };
        (driver, Arc::new(MotionScheduler::new(&config, drive)))
    }

    #[test]
    fn starts_stopped() {
        let (_, s) = scheduler(50);
        assert_eq!(s.direction(), Direction::Stop);
        assert_eq!(s.tick(), DriveSignal::STOP);
    }

    #[test]
    fn set_direction_applies_on_next_tick() {
        let (driver, s) = scheduler(50);
        s.set_direction(Direction::Backward);
        assert!(driver.writes().is_empty(), "setting a direction must not write");

        s.tick();
        assert_eq!(driver.drive_writes(), vec![(0, -100), (1, -100)]);
    }

    #[test]
    fn repeated_direction_is_idempotent() {
        let (_, s) = scheduler(50);
        s.set_direction(Direction::Left);
        s.set_direction(Direction::Left);
        assert_eq!(s.direction(), Direction::Left);
        assert_eq!(s.tick(), s.tick());
    }

    #[test]
    fn force_stop_reports_previous_and_next_tick_stops() {
        let (driver, s) = scheduler(50);
        for d in [Direction::Forward, Direction::Left, Direction::Right, Direction::Backward] {
            s.set_direction(d);
            s.tick();
            driver.clear();

            assert_eq!(s.force_stop("connection closed"), d);
            assert_eq!(s.tick(), DriveSignal::STOP);
            assert_eq!(driver.drive_writes(), vec![(0, 0), (1, 0)]);
        }
        assert_eq!(s.force_stop("again"), Direction::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_driving_without_new_commands() {
        let (driver, s) = scheduler(50);
        let (stop_tx, stop_rx) = watch::channel(false);
        s.set_direction(Direction::Forward);
        let task = tokio::spawn(Arc::clone(&s).run(stop_rx));

        tokio::time::sleep(Duration::from_millis(525)).await;
        stop_tx.send(true).unwrap();
        task.await.unwrap();

        let writes = driver.drive_writes();
        // 11 ticks in 525 ms (the first one fires immediately), plus the
        // final STOP.
        assert_eq!(writes.len(), 2 * 12);
        assert!(writes[..22].iter().all(|&(_, speed)| speed == 100));
        assert_eq!(&writes[22..], &[(0, 0), (1, 0)]);
        assert_eq!(s.direction(), Direction::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn run_exits_when_sender_dropped() {
        let (driver, s) = scheduler(50);
        let (stop_tx, stop_rx) = watch::channel(false);
        s.set_direction(Direction::Right);
        let task = tokio::spawn(Arc::clone(&s).run(stop_rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(stop_tx);
        task.await.unwrap();
        assert_eq!(driver.drive_writes().last(), Some(&(1, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn tick_period_is_constant_while_lids_move() {
        let (driver, s) = scheduler(50);
        let lids = Arc::new(LidBank::new(
            &LidSpec::default_set(),
            &LidMotion::default(),
            driver.clone(),
        ));
        let (stop_tx, stop_rx) = watch::channel(false);
        s.set_direction(Direction::Forward);
        let task = tokio::spawn(Arc::clone(&s).run(stop_rx));

        let mut motions = Vec::new();
        for id in [1, 2, 3] {
            let lids = Arc::clone(&lids);
            motions.push(tokio::spawn(async move { lids.open(LidId(id)).await }));
        }

        tokio::time::sleep(Duration::from_millis(50 * 120 + 25)).await;
        stop_tx.send(true).unwrap();
        task.await.unwrap();
        for m in motions {
            m.await.unwrap().unwrap();
        }

        let left_ticks: Vec<_> = driver
            .writes()
            .into_iter()
            .filter_map(|w| match w {
                DriverWrite::Drive { channel: 0, speed: 100, at } => Some(at),
                _ => None,
            })
            .collect();
        assert!(left_ticks.len() > 100, "got {} ticks", left_ticks.len());

        let period = Duration::from_millis(50);
        let tolerance = Duration::from_millis(2);
        for pair in left_ticks.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap + tolerance >= period && gap <= period + tolerance,
                "tick gap {gap:?} drifted from {period:?}"
            );
        }
        assert_eq!(driver.servo_writes().len(), 6);
    }
}
