// src/obstacle.rs
//
// Obstacle sensing at the core's boundary.
//
// Two sensor styles feed the same `ObstacleSignal`:
//   - TriggerZone: a volume in front of the car whose stay/exit callbacks
//     may fire any number of times per tick. Reads are level-triggered and
//     the last callback before the read wins.
//   - RayObstacleSensor: three forward rays; the hit pattern picks a side.
//
// An obstacle dead ahead gives no geometric preference, so both resolve it
// by steering left and flag a sensor conflict.

use tracing::{debug, warn};

use crate::avoidance::probe::{CollisionProbe, OpenRoad, ProbeFan};
use crate::config::ObstacleConfig;
use crate::types::{ObstacleSignal, Vec2};

/// External obstacle monitor: level-triggered signal plus ray-cast queries.
pub trait ObstacleMonitor: CollisionProbe {
    fn signal(&mut self) -> ObstacleSignal;

    /// True when the last signal came from degenerate geometry.
    fn sensor_conflict(&self) -> bool {
        false
    }
}

/// No obstacle sensing at all (e.g. replaying recorded camera frames).
impl ObstacleMonitor for OpenRoad {
    fn signal(&mut self) -> ObstacleSignal {
        ObstacleSignal::clear()
    }
}

// ============================================================================
// TRIGGER ZONE
// ============================================================================

#[derive(Debug, Clone)]
pub struct TriggerZone {
    steer_magnitude: f32,
    center_tolerance: f32,
    signal: ObstacleSignal,
    conflict: bool,
}

impl TriggerZone {
    pub fn new(config: &ObstacleConfig) -> Self {
        Self {
            steer_magnitude: config.steer_magnitude,
            center_tolerance: config.center_tolerance,
            signal: ObstacleSignal::clear(),
            conflict: false,
        }
    }

    /// Obstacle inside the zone at `relative` (vehicle frame, +x right).
    pub fn on_stay(&mut self, relative: Vec2) {
        let (correction, conflict) = if relative.x.abs() < self.center_tolerance {
            (-self.steer_magnitude, true)
        } else {
            // Steer away from the side the obstacle is on
            (-relative.x.signum() * self.steer_magnitude, false)
        };
        if conflict && !self.conflict {
            warn!(
                "⚖️  Obstacle dead ahead (x={:+.2}): defaulting to steer left",
                relative.x
            );
        }
        self.signal = ObstacleSignal::detected(correction);
        self.conflict = conflict;
        debug!("🚧 Trigger stay at x={:+.2} → {:+.2}", relative.x, correction);
    }

    pub fn on_exit(&mut self) {
        self.signal = ObstacleSignal::clear();
        self.conflict = false;
    }

    pub fn signal(&self) -> ObstacleSignal {
        self.signal
    }

    pub fn is_conflicted(&self) -> bool {
        self.conflict
    }
}

// ============================================================================
// RAY SENSOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaySensing {
    pub signal: ObstacleSignal,
    pub conflict: bool,
}

#[derive(Debug, Clone)]
pub struct RayObstacleSensor {
    fan: ProbeFan,
    steer_power: f32,
}

impl RayObstacleSensor {
    pub fn new(fan: ProbeFan, steer_power: f32) -> Self {
        Self { fan, steer_power }
    }

    pub fn sense(&self, probe: &dyn CollisionProbe) -> RaySensing {
        let reading = self.fan.scan(probe);
        let [left, center, right] = reading.hits_within(self.fan.max_distance());

        if !(left || center || right) {
            return RaySensing {
                signal: ObstacleSignal::clear(),
                conflict: false,
            };
        }

        let (correction, conflict) = match (left, right) {
            (true, false) => (self.steer_power, false),
            (false, true) => (-self.steer_power, false),
            _ => (-self.steer_power, true),
        };

        RaySensing {
            signal: ObstacleSignal::detected(correction),
            conflict,
        }
    }
}
