// src/arbiter.rs
//
// Chooses between the autonomous pipeline and the driver each tick.
//
// Mode changes on an explicit toggle, or when the driver touches the steer
// or throttle axis while autonomous. Manual throttle and brake follow
// rate-limited ramps; autonomous propulsion ramps up by a fixed increment
// per tick while the road is clear and follows the avoidance speed
// otherwise. Switching modes never touches PID or avoidance state.

use serde::Serialize;
use tracing::{debug, info};

use crate::avoidance::SpeedDirective;
use crate::config::{ManualConfig, SpeedConfig};
use crate::types::{Command, ManualInput, Mode};

// ============================================================================
// RAMP
// ============================================================================

/// Value that moves toward a target at separate rise and fall rates (1/s).
#[derive(Debug, Clone, Copy)]
pub struct Ramp {
    rise_per_sec: f32,
    fall_per_sec: f32,
    value: f32,
}

impl Ramp {
    pub fn new(rise_per_sec: f32, fall_per_sec: f32) -> Self {
        Self {
            rise_per_sec,
            fall_per_sec,
            value: 0.0,
        }
    }

    pub fn step(&mut self, target: f32, dt: f32) -> f32 {
        if target > self.value {
            self.value = (self.value + self.rise_per_sec * dt).min(target);
        } else if target < self.value {
            self.value = (self.value - self.fall_per_sec * dt).max(target);
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn set(&mut self, value: f32) {
        self.value = value;
    }
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwitchReason {
    Toggle,
    ManualOverride,
    LineLost,
}

impl SwitchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchReason::Toggle => "toggle",
            SwitchReason::ManualOverride => "manual input",
            SwitchReason::LineLost => "line lost",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeSwitch {
    pub from: Mode,
    pub to: Mode,
    pub reason: SwitchReason,
}

/// What the autonomous pipeline wants this tick.
#[derive(Debug, Clone, Copy)]
pub struct AutonomousProposal {
    /// Smoothed normalized steering
    pub steer: f32,
    pub speed: SpeedDirective,
    /// Filtered lane error, if the lane was seen
    pub lane_error: Option<f32>,
    /// Lane or frame missing: keep the previous propulsion
    pub hold: bool,
}

// ============================================================================
// ARBITER
// ============================================================================

pub struct CommandArbiter {
    mode: Mode,
    manual: ManualConfig,
    speed: SpeedConfig,
    max_steering_angle: f32,
    throttle: Ramp,
    brake: Ramp,
    auto_speed: f32,
    last_command: Command,
}

impl CommandArbiter {
    pub fn new(manual: ManualConfig, speed: SpeedConfig, max_steering_angle: f32) -> Self {
        Self {
            mode: Mode::Autonomous,
            throttle: Ramp::new(manual.accelerate_per_sec, manual.decelerate_per_sec),
            brake: Ramp::new(manual.brake_apply_per_sec, manual.brake_release_per_sec),
            manual,
            speed,
            max_steering_angle,
            auto_speed: 0.0,
            last_command: Command::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn last_command(&self) -> Command {
        self.last_command
    }

    pub fn autonomous_speed(&self) -> f32 {
        self.auto_speed
    }

    /// Apply this tick's mode triggers. A toggle is authoritative for its
    /// tick; the input override only applies when no toggle fired.
    pub fn update_mode(&mut self, input: &ManualInput) -> Option<ModeSwitch> {
        let input = input.sanitized();
        if input.toggle_mode {
            return Some(self.switch_to(self.mode.toggled(), SwitchReason::Toggle));
        }
        if self.mode == Mode::Autonomous && self.has_driver_input(&input) {
            return Some(self.switch_to(Mode::Manual, SwitchReason::ManualOverride));
        }
        None
    }

    /// Drop to manual from inside the pipeline (e.g. the lane stayed lost).
    pub fn force_manual(&mut self, reason: SwitchReason) -> Option<ModeSwitch> {
        if self.mode == Mode::Manual {
            return None;
        }
        Some(self.switch_to(Mode::Manual, reason))
    }

    fn has_driver_input(&self, input: &ManualInput) -> bool {
        let dz = self.manual.override_deadzone;
        input.steer.abs() > dz || input.throttle > dz
    }

    fn switch_to(&mut self, to: Mode, reason: SwitchReason) -> ModeSwitch {
        let from = self.mode;
        self.mode = to;
        match to {
            Mode::Manual => {
                self.throttle.set(self.last_command.propulsion);
                self.brake.set(self.last_command.brake);
            }
            Mode::Autonomous => {
                self.auto_speed = self.last_command.propulsion;
            }
        }
        info!(
            "🔀 Mode {} → {} ({})",
            from.as_str(),
            to.as_str(),
            reason.as_str()
        );
        ModeSwitch { from, to, reason }
    }

    /// Produce the command for the current mode.
    pub fn compose(
        &mut self,
        input: &ManualInput,
        proposal: Option<&AutonomousProposal>,
        dt: f32,
    ) -> Command {
        let command = match (self.mode, proposal) {
            (Mode::Manual, _) => self.manual_command(&input.sanitized(), dt),
            (Mode::Autonomous, Some(p)) => self.autonomous_command(p),
            (Mode::Autonomous, None) => self.last_command,
        };
        self.last_command = command;
        command
    }

    fn manual_command(&mut self, input: &ManualInput, dt: f32) -> Command {
        Command {
            steering_angle: input.steer * self.max_steering_angle,
            propulsion: self.throttle.step(input.throttle, dt),
            brake: self.brake.step(input.brake, dt),
        }
    }

    fn autonomous_command(&mut self, proposal: &AutonomousProposal) -> Command {
        let brake = if proposal.hold {
            self.speed.line_lost_brake
        } else {
            match proposal.speed {
                SpeedDirective::Ramp => {
                    let cap = self.cruise_cap(proposal.lane_error);
                    let inc = self.speed.ramp_increment;
                    self.auto_speed = if self.auto_speed > cap {
                        (self.auto_speed - inc).max(cap)
                    } else {
                        (self.auto_speed + inc).min(cap)
                    };
                }
                SpeedDirective::Reduced(v) | SpeedDirective::Hold(v) => {
                    self.auto_speed = v;
                }
            }
            0.0
        };

        debug!(
            "🚗 Autonomous steer={:+.3} speed={:.2} brake={:.2}",
            proposal.steer, self.auto_speed, brake
        );

        Command {
            steering_angle: proposal.steer.clamp(-1.0, 1.0) * self.max_steering_angle,
            propulsion: self.auto_speed,
            brake,
        }
    }

    fn cruise_cap(&self, lane_error: Option<f32>) -> f32 {
        let s = &self.speed;
        match lane_error.map(f32::abs) {
            Some(e) if s.curve_slowdown && e > s.sharp_turn_error => {
                s.sharp_turn_speed.min(s.max_speed)
            }
            Some(e) if s.curve_slowdown && e > s.moderate_turn_error => {
                s.moderate_turn_speed.min(s.max_speed)
            }
            _ => s.max_speed,
        }
    }
}
