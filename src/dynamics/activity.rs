use bitflags::bitflags;

use crate::math::Fix64;

use super::island::IslandHandle;

bitflags! {
    /// Change-tracking flags for a rigid body, mirroring the teacher's
    /// `RigidBodyChanges` so the pipeline can cheaply detect what a host
    /// mutated between ticks (position, velocities, shape, ...).
    #[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct RigidBodyChanges: u32 {
        const MODIFIED = 1 << 0;
        const POSITION = 1 << 1;
        const VELOCITIES = 1 << 2;
        const SLEEP = 1 << 3;
        const COLLIDER = 1 << 4;
        const TYPE = 1 << 5;
    }
}

/// Per-body bookkeeping for the deactivation manager (spec.md section 4.7):
/// which island the body currently belongs to, how long its kinetic energy
/// has stayed below the sleep threshold, and whether the body is currently
/// asleep.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ActivityInfo {
    pub island: Option<IslandHandle>,
    /// Time (seconds) the body's kinetic energy has remained below
    /// `velocity_lower_limit`. Reset to zero on any wake event.
    pub low_velocity_time: Fix64,
    pub sleeping: bool,
}

impl Default for ActivityInfo {
    fn default() -> Self {
        ActivityInfo { island: None, low_velocity_time: Fix64::ZERO, sleeping: false }
    }
}

impl ActivityInfo {
    /// Whether this body currently qualifies as a deactivation candidate
    /// given `low_velocity_time_minimum`.
    pub fn is_candidate(&self, low_velocity_time_minimum: Fix64) -> bool {
        self.low_velocity_time >= low_velocity_time_minimum
    }

    pub fn wake_up(&mut self) {
        self.low_velocity_time = Fix64::ZERO;
        self.sleeping = false;
    }
}
