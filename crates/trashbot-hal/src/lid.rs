//! Trashcan lid actuators.
//!
//! A lid servo has no position feedback, so a motion is a timed pulse: the
//! target angle is held for [`LidMotion::hold_ms`] to let the lid travel,
//! then the pulse train is switched off.  Each [`LidActuator`] accepts one
//! motion at a time; a request that arrives while the lid is moving is
//! rejected with [`BotError::LidBusy`] rather than queued.
//!
//! The timed part runs in its own Tokio task.  Dropping the future returned
//! by [`LidActuator::open`] (for example because the client disconnected)
//! does not cut the motion short.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use trashbot_types::{BotError, LidId, LidSpec, LidState};

use crate::driver::ActuatorDriver;

/// Pulse width that releases a servo.
pub const NEUTRAL_PULSE_US: u16 = 0;

/// Angle and timing constants shared by every lid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LidMotion {
    /// How long a target angle is held before the pulse is released.
    pub hold_ms: u64,
    pub open_angle_deg: u16,
    pub closed_angle_deg: u16,
    /// Pulse width at 0°.
    pub min_pulse_us: u16,
    /// Pulse width at 180°.
    pub max_pulse_us: u16,
}

impl Default for LidMotion {
    fn default() -> Self {
        Self {
            hold_ms: 1000,
            open_angle_deg: 60,
            closed_angle_deg: 0,
            min_pulse_us: 500,
            max_pulse_us: 2500,
        }
    }
}

impl LidMotion {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    /// Linear angle to pulse-width mapping over 0–180°.  Angles above 180°
    /// saturate.
    pub fn pulse_for_angle(&self, angle_deg: u16) -> u16 {
        let angle = u32::from(angle_deg.min(180));
        let span = u32::from(self.max_pulse_us.saturating_sub(self.min_pulse_us));
        let offset = span * angle / 180;
        self.min_pulse_us.saturating_add(offset as u16)
    }
}

/// One physical lid with its own servo and busy state.
pub struct LidActuator {
    spec: LidSpec,
    motion: LidMotion,
    state: Mutex<LidState>,
    completed: AtomicU64,
    driver: Arc<dyn ActuatorDriver>,
}

impl LidActuator {
    pub fn new(spec: LidSpec, motion: LidMotion, driver: Arc<dyn ActuatorDriver>) -> Self {
        Self {
            spec,
            motion,
            state: Mutex::new(LidState::Idle),
            completed: AtomicU64::new(0),
            driver,
        }
    }

    pub fn id(&self) -> LidId {
        self.spec.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn state(&self) -> LidState {
        *self.lock_state()
    }

    /// Number of motions that ran to completion since startup.
    pub fn completed_motions(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Swing the lid to the open angle and hold it there for the configured
    /// time.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::LidBusy`] immediately if the lid is already
    /// moving.
    pub async fn open(self: &Arc<Self>) -> Result<(), BotError> {
        self.run(LidState::Opening, self.motion.open_angle_deg).await
    }

    /// Swing the lid to the closed angle and hold it there for the
    /// configured time.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::LidBusy`] immediately if the lid is already
    /// moving.
    pub async fn close(self: &Arc<Self>) -> Result<(), BotError> {
        self.run(LidState::Closing, self.motion.closed_angle_deg).await
    }

    async fn run(self: &Arc<Self>, phase: LidState, angle_deg: u16) -> Result<(), BotError> {
        self.begin(phase)?;

        let lid = Arc::clone(self);
        let pulse = self.motion.pulse_for_angle(angle_deg);
        let hold = self.motion.hold();
        let motion = tokio::spawn(async move {
            let mut settle = SettleOnDrop {
                lid: Arc::clone(&lid),
                released: false,
            };
            info!(lid = %lid.id(), name = lid.name(), ?phase, pulse, "lid motion started");
            lid.write_pulse(pulse);
            tokio::time::sleep(hold).await;
            lid.write_pulse(NEUTRAL_PULSE_US);
            settle.released = true;
            lid.completed.fetch_add(1, Ordering::SeqCst);
            info!(lid = %lid.id(), ?phase, "lid motion finished");
        });

        motion.await.map_err(|e| BotError::HardwareFault {
            component: format!("lid_{}", self.id()),
            details: format!("lid motion aborted: {e}"),
        })
    }

    /// Check-and-set: claim the lid for `phase` if it is idle.
    fn begin(&self, phase: LidState) -> Result<(), BotError> {
        let mut state = self.lock_state();
        if *state != LidState::Idle {
            return Err(BotError::LidBusy(self.id()));
        }
        *state = phase;
        Ok(())
    }

    fn write_pulse(&self, pulse_us: u16) {
        if let Err(e) = self.driver.set_servo_pulse(self.spec.servo_channel, pulse_us) {
            warn!(lid = %self.id(), pulse_us, error = %e, "servo write dropped");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LidState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Returns the lid to [`LidState::Idle`] however the motion task ends.
///
/// A motion cut off before its release write (runtime shutdown, task abort)
/// still gets the neutral pulse, so the servo is never left driven.
struct SettleOnDrop {
    lid: Arc<LidActuator>,
    released: bool,
}

impl Drop for SettleOnDrop {
    fn drop(&mut self) {
        if !self.released {
            warn!(lid = %self.lid.id(), "lid motion cut short; releasing servo");
            self.lid.write_pulse(NEUTRAL_PULSE_US);
        }
        *self.lid.lock_state() = LidState::Idle;
    }
}

/// Every configured lid, keyed by id.  Membership in this map is the only
/// validity check for a lid id.
#[derive(Default)]
pub struct LidBank {
    lids: BTreeMap<LidId, Arc<LidActuator>>,
}

impl LidBank {
    pub fn new(specs: &[LidSpec], motion: &LidMotion, driver: Arc<dyn ActuatorDriver>) -> Self {
        let lids = specs
            .iter()
            .map(|spec| {
                let lid = LidActuator::new(spec.clone(), motion.clone(), Arc::clone(&driver));
                (spec.id, Arc::new(lid))
            })
            .collect();
        Self { lids }
    }

    pub fn contains(&self, id: LidId) -> bool {
        self.lids.contains_key(&id)
    }

    pub fn get(&self, id: LidId) -> Option<&Arc<LidActuator>> {
        self.lids.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = LidId> + '_ {
        self.lids.keys().copied()
    }

    /// # Errors
    ///
    /// [`BotError::InvalidLidId`] for an unknown id, otherwise see
    /// [`LidActuator::open`].
    pub async fn open(&self, id: LidId) -> Result<(), BotError> {
        self.get(id).ok_or(BotError::InvalidLidId)?.open().await
    }

    /// # Errors
    ///
    /// [`BotError::InvalidLidId`] for an unknown id, otherwise see
    /// [`LidActuator::close`].
    pub async fn close(&self, id: LidId) -> Result<(), BotError> {
        self.get(id).ok_or(BotError::InvalidLidId)?.close().await
    }
}
