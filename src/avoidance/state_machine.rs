// src/avoidance/state_machine.rs
//
// Obstacle avoidance and recovery sequencing.
//
//   Normal ──detected──▶ Avoiding ──clear for avoidance_duration──▶ Recovering
//     ▲                     ▲                                          │
//     │                     └──────────────detected────────────────────┤
//     └────────────────recovery_duration elapsed, probes clear─────────┘
//
// Avoiding steers with the correction captured on entry. Recovering blends
// lane following back in while steering gently toward center; a forward
// probe closer than the safety distance aborts the gentle return and steers
// hard toward the freer side instead.
//
// There is no separate re-trigger flag: a detection only engages from
// Normal, and Avoiding holds its timer while the obstacle stays detected,
// so one encounter engages exactly once.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::probe::{CollisionProbe, ProbeFan, ProbeReading};
use crate::config::{AvoidanceConfig, ProbeConfig, SpeedConfig, SteeringConfig};
use crate::smoother::SteeringSmoother;
use crate::types::{ObstacleSignal, SteerSide};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AvoidancePhase {
    Normal,
    Avoiding,
    Recovering,
}

impl AvoidancePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvoidancePhase::Normal => "NORMAL",
            AvoidancePhase::Avoiding => "AVOIDING",
            AvoidancePhase::Recovering => "RECOVERING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AvoidanceState {
    pub phase: AvoidancePhase,
    /// Seconds left in the current phase; primed for the next phase otherwise
    pub timer: f32,
    pub stored_correction: f32,
    pub recovery_steer: f32,
    pub blend_line: f32,
    pub blend_obstacle: f32,
}

/// Speed the autonomous drive should follow this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SpeedDirective {
    /// Ramp toward the cruise maximum
    Ramp,
    /// Reduced speed while avoiding
    Reduced(f32),
    /// Fixed speed during recovery
    Hold(f32),
}

impl SpeedDirective {
    pub fn obstacle_present(&self) -> bool {
        !matches!(self, SpeedDirective::Ramp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AvoidanceTransition {
    Engaged { correction: f32 },
    Reengaged { correction: f32 },
    RecoveryStarted { recovery_steer: f32 },
    RecoveryAborted { side: SteerSide, nearest: f32 },
    Cleared,
}

#[derive(Debug, Clone, Copy)]
pub struct AvoidanceInput {
    pub obstacle: ObstacleSignal,
    /// Lane-following steering for this tick, `None` to hold the last one
    pub lane_steer: Option<f32>,
    pub dt: f32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AvoidanceOutput {
    pub phase: AvoidancePhase,
    /// Unsmoothed steering target, normalized
    pub target_steer: f32,
    /// Smoothed steering to apply, normalized
    pub steer: f32,
    pub speed: SpeedDirective,
    pub transition: Option<AvoidanceTransition>,
    pub probe: Option<ProbeReading>,
}

// ============================================================================
// STATE MACHINE
// ============================================================================

pub struct AvoidanceStateMachine {
    config: AvoidanceConfig,
    probe_config: ProbeConfig,
    fan: ProbeFan,
    avoidance_speed: f32,
    recovery_speed: f32,
    state: AvoidanceState,
    last_lane_steer: f32,
    smoother: SteeringSmoother,
}

impl AvoidanceStateMachine {
    pub fn new(
        config: AvoidanceConfig,
        probe_config: ProbeConfig,
        speed: &SpeedConfig,
        steering: &SteeringConfig,
    ) -> Self {
        let state = AvoidanceState {
            phase: AvoidancePhase::Normal,
            timer: config.avoidance_duration,
            stored_correction: 0.0,
            recovery_steer: 0.0,
            blend_line: 1.0,
            blend_obstacle: 0.0,
        };
        Self {
            fan: ProbeFan::from_config(&probe_config),
            config,
            probe_config,
            avoidance_speed: speed.avoidance_speed,
            recovery_speed: speed.recovery_speed,
            state,
            last_lane_steer: 0.0,
            smoother: SteeringSmoother::new(steering.smoothing_rate, steering.max_step),
        }
    }

    pub fn phase(&self) -> AvoidancePhase {
        self.state.phase
    }

    pub fn state(&self) -> AvoidanceState {
        self.state
    }

    pub fn tick(
        &mut self,
        input: &AvoidanceInput,
        probe: Option<&dyn CollisionProbe>,
    ) -> AvoidanceOutput {
        if let Some(steer) = input.lane_steer {
            self.last_lane_steer = steer;
        }
        let obstacle = input.obstacle;
        let mut transition = None;
        let mut reading = None;
        let mut hard_override = false;

        match self.state.phase {
            AvoidancePhase::Normal => {
                if obstacle.detected {
                    self.engage(obstacle.suggested_correction);
                    info!(
                        "🚧 Obstacle ahead: avoiding with correction {:+.2}",
                        self.state.stored_correction
                    );
                    transition = Some(AvoidanceTransition::Engaged {
                        correction: self.state.stored_correction,
                    });
                }
            }

            AvoidancePhase::Avoiding => {
                if !obstacle.detected {
                    self.state.timer = (self.state.timer - input.dt).max(0.0);
                    if expired(self.state.timer, input.dt) {
                        self.begin_recovery();
                        info!(
                            "↪️  Obstacle cleared: recovering with {:+.2}",
                            self.state.recovery_steer
                        );
                        transition = Some(AvoidanceTransition::RecoveryStarted {
                            recovery_steer: self.state.recovery_steer,
                        });
                    }
                }
            }

            AvoidancePhase::Recovering => {
                if obstacle.detected {
                    self.engage(obstacle.suggested_correction);
                    warn!(
                        "🚧 Obstacle again during recovery: re-avoiding with {:+.2}",
                        self.state.stored_correction
                    );
                    transition = Some(AvoidanceTransition::Reengaged {
                        correction: self.state.stored_correction,
                    });
                } else {
                    self.state.timer = (self.state.timer - input.dt).max(0.0);
                    self.update_blend();

                    if let Some(probe) = probe.filter(|_| self.probe_config.enabled) {
                        let scan = self.fan.scan(probe);
                        reading = Some(scan);
                        let nearest = scan.nearest();
                        if nearest < self.probe_config.collision_check_distance {
                            let side = scan.freer_side();
                            self.state.recovery_steer = side.sign() * self.config.hard_correction;
                            self.state.timer = self.state.timer.max(self.config.min_recovery_time);
                            hard_override = true;
                            warn!(
                                "⚠️  Recovery path blocked at {:.1}m: steering hard {}",
                                nearest,
                                side.as_str()
                            );
                            transition =
                                Some(AvoidanceTransition::RecoveryAborted { side, nearest });
                        }
                    }

                    if !hard_override && expired(self.state.timer, input.dt) {
                        self.finish();
                        info!("✅ Recovery complete: back to lane following");
                        transition = Some(AvoidanceTransition::Cleared);
                    }
                }
            }
        }

        let lane = self.last_lane_steer;
        let target_steer = match self.state.phase {
            AvoidancePhase::Normal => lane,
            AvoidancePhase::Avoiding => self.state.stored_correction,
            AvoidancePhase::Recovering if hard_override => self.state.recovery_steer,
            AvoidancePhase::Recovering => {
                self.state.blend_line * lane + self.state.blend_obstacle * self.state.recovery_steer
            }
        }
        .clamp(-1.0, 1.0);

        let speed = match self.state.phase {
            AvoidancePhase::Normal => SpeedDirective::Ramp,
            AvoidancePhase::Avoiding => SpeedDirective::Reduced(self.avoidance_speed),
            AvoidancePhase::Recovering => SpeedDirective::Hold(self.recovery_speed),
        };

        // Lane-following with no fresh estimate keeps the applied steering.
        let holding = input.lane_steer.is_none()
            && self.state.phase == AvoidancePhase::Normal
            && transition.is_none();
        let steer = if holding {
            self.smoother.current()
        } else {
            self.smoother.step(target_steer, input.dt)
        };

        debug!(
            "🧭 {} target={:+.3} steer={:+.3} timer={:.2}",
            self.state.phase.as_str(),
            target_steer,
            steer,
            self.state.timer
        );

        AvoidanceOutput {
            phase: self.state.phase,
            target_steer,
            steer,
            speed,
            transition,
            probe: reading,
        }
    }

    fn engage(&mut self, correction: f32) {
        self.state.phase = AvoidancePhase::Avoiding;
        self.state.stored_correction = correction.clamp(-1.0, 1.0);
        self.state.timer = self.config.avoidance_duration;
        self.state.blend_line = self.config.blend_line_start;
        self.state.blend_obstacle = self.config.blend_obstacle_start;
    }

    fn begin_recovery(&mut self) {
        self.state.phase = AvoidancePhase::Recovering;
        self.state.timer = self.config.recovery_duration;
        self.state.recovery_steer = -self.state.stored_correction * self.config.recovery_factor;
        self.state.blend_line = self.config.blend_line_start;
        self.state.blend_obstacle = self.config.blend_obstacle_start;
    }

    fn update_blend(&mut self) {
        let progress = (1.0 - self.state.timer / self.config.recovery_duration).clamp(0.0, 1.0);
        let line0 = self.config.blend_line_start;
        let obstacle0 = self.config.blend_obstacle_start;
        self.state.blend_line = line0 + (1.0 - line0) * progress;
        self.state.blend_obstacle = obstacle0 * (1.0 - progress);
    }

    fn finish(&mut self) {
        self.state = AvoidanceState {
            phase: AvoidancePhase::Normal,
            timer: self.config.avoidance_duration,
            stored_correction: 0.0,
            recovery_steer: 0.0,
            blend_line: 1.0,
            blend_obstacle: 0.0,
        };
    }
}

/// A countdown is over once less than half a tick remains. Repeated f32
/// subtraction of `dt` leaves a small positive residue otherwise.
fn expired(timer: f32, dt: f32) -> bool {
    timer <= dt * 0.5
}
