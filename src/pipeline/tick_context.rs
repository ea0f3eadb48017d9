// src/pipeline/tick_context.rs
//
// Everything decided in one control tick, in one place. Built by the
// controller and handed back to the loop for logging, metrics and tests.

use serde::Serialize;

use crate::arbiter::ModeSwitch;
use crate::avoidance::{AvoidanceOutput, AvoidancePhase};
use crate::error::Degradation;
use crate::pid::PidState;
use crate::types::{Command, LaneEstimate, Mode, ObstacleSignal};

#[derive(Debug, Clone, Serialize)]
pub struct TickContext {
    pub tick: u64,
    /// Capture tick of the frame that was estimated, if any
    pub frame_tick: Option<u64>,
    pub estimate: LaneEstimate,
    /// Lane error after the moving-average filter
    pub filtered_error: Option<f32>,
    /// Raw PID output before speed scaling, if the PID ran
    pub pid_output: Option<f32>,
    pub obstacle: ObstacleSignal,
    pub avoidance: Option<AvoidanceOutput>,
    pub phase: AvoidancePhase,
    pub mode: Mode,
    pub mode_switch: Option<ModeSwitch>,
    pub degradations: Vec<Degradation>,
    /// Consecutive ticks the lane has been missing from scanned frames
    pub lost_ticks: u32,
    /// Set on the tick the lane came back, with how long it was gone
    pub reacquired_after: Option<u32>,
    pub pid: PidState,
    pub command: Command,
}

impl TickContext {
    pub fn new(tick: u64, mode: Mode, phase: AvoidancePhase) -> Self {
        Self {
            tick,
            frame_tick: None,
            estimate: LaneEstimate::no_detection(),
            filtered_error: None,
            pid_output: None,
            obstacle: ObstacleSignal::clear(),
            avoidance: None,
            phase,
            mode,
            mode_switch: None,
            degradations: Vec::new(),
            lost_ticks: 0,
            reacquired_after: None,
            pid: PidState::default(),
            command: Command::default(),
        }
    }

    pub fn has(&self, degradation: Degradation) -> bool {
        self.degradations.contains(&degradation)
    }

    /// True when the autonomous command was held instead of recomputed.
    pub fn is_holding(&self) -> bool {
        self.degradations.iter().any(Degradation::holds_command)
    }

    pub fn degrade(&mut self, degradation: Degradation) {
        if !self.has(degradation) {
            self.degradations.push(degradation);
        }
    }
}
