// src/pipeline/controller.rs
//
// One control tick, start to finish:
//
//   frame ─▶ LaneEstimator ─▶ ErrorFilter ─▶ PID ─▶ speed scale ─┐
//                                                                ▼
//   obstacle signal + probes ─────────────────────▶ AvoidanceStateMachine
//                                                                │
//   manual input ─────────────────────────────────▶ CommandArbiter ─▶ Command
//
// The estimator runs in both modes. PID and avoidance only advance while
// autonomous, so handing control to the driver and back resumes exactly
// where they left off.

use tracing::{debug, info, warn};

use crate::arbiter::{AutonomousProposal, CommandArbiter, SwitchReason};
use crate::avoidance::{
    AvoidanceInput, AvoidancePhase, AvoidanceState, AvoidanceStateMachine, CollisionProbe,
};
use crate::config::{Config, SteeringConfig};
use crate::error::Degradation;
use crate::lane_detection::LaneEstimator;
use crate::pid::{PidController, PidState};
use crate::smoother::ErrorFilter;
use crate::types::{Frame, ManualInput, Mode, ObstacleSignal};

use super::tick_context::TickContext;

pub struct VehicleController {
    estimator: LaneEstimator,
    filter: ErrorFilter,
    pid: PidController,
    avoidance: AvoidanceStateMachine,
    arbiter: CommandArbiter,
    steering: SteeringConfig,
    disengage_after_lost_ticks: Option<u32>,
    tick: u64,
    lost_ticks: u32,
    frame_dims: Option<(usize, usize)>,
}

impl VehicleController {
    pub fn new(config: &Config) -> Self {
        Self {
            estimator: LaneEstimator::new(config.estimator.clone()),
            filter: ErrorFilter::new(config.filter.window),
            pid: PidController::from_config(&config.pid),
            avoidance: AvoidanceStateMachine::new(
                config.avoidance.clone(),
                config.probe.clone(),
                &config.speed,
                &config.steering,
            ),
            arbiter: CommandArbiter::new(
                config.manual.clone(),
                config.speed.clone(),
                config.steering.max_steering_angle_deg,
            ),
            steering: config.steering.clone(),
            disengage_after_lost_ticks: config.run.disengage_after_lost_ticks,
            tick: 0,
            lost_ticks: 0,
            frame_dims: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.arbiter.mode()
    }

    pub fn phase(&self) -> AvoidancePhase {
        self.avoidance.phase()
    }

    pub fn pid_state(&self) -> PidState {
        self.pid.state()
    }

    pub fn avoidance_state(&self) -> AvoidanceState {
        self.avoidance.state()
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Steering scale for the current autonomous speed. Falls linearly from
    /// 1.0 at standstill to `high_speed_scale` at the reference speed.
    fn speed_scale(&self) -> f32 {
        let s = &self.steering;
        let ratio = (self.arbiter.autonomous_speed() / s.scale_reference_speed).clamp(0.0, 1.0);
        1.0 - (1.0 - s.high_speed_scale) * ratio
    }

    pub fn tick(
        &mut self,
        frame: Option<Frame>,
        obstacle: ObstacleSignal,
        manual: ManualInput,
        probe: &dyn CollisionProbe,
        dt: f32,
    ) -> TickContext {
        let tick = self.tick;
        self.tick += 1;

        let mode_switch = self.arbiter.update_mode(&manual);
        let mut ctx = TickContext::new(tick, self.arbiter.mode(), self.avoidance.phase());
        ctx.mode_switch = mode_switch;
        ctx.obstacle = obstacle;

        // ── Perception ──────────────────────────────────────────
        match frame {
            Some(frame) => {
                let dims = (frame.width(), frame.height());
                if self.frame_dims.is_some_and(|d| d != dims) {
                    info!("📐 Frame size changed to {}x{}", dims.0, dims.1);
                }
                self.frame_dims = Some(dims);
                ctx.frame_tick = Some(frame.captured_tick);

                let region = self.estimator.default_region(&frame);
                ctx.estimate = self.estimator.estimate(&frame, region);

                match ctx.estimate.error {
                    Some(error) => {
                        if self.lost_ticks > 0 {
                            info!("🛣️  Lane reacquired after {} ticks", self.lost_ticks);
                            ctx.reacquired_after = Some(self.lost_ticks);
                        }
                        self.lost_ticks = 0;
                        ctx.filtered_error = Some(self.filter.push(error));
                    }
                    None => {
                        if self.lost_ticks == 0 {
                            warn!("❓ Lane lost at tick {}", tick);
                        }
                        self.lost_ticks = self.lost_ticks.saturating_add(1);
                        self.filter.clear();
                        ctx.degrade(Degradation::NoDetection);
                    }
                }
            }
            None => ctx.degrade(Degradation::NoFrame),
        }
        ctx.lost_ticks = self.lost_ticks;

        // ── Autonomous pipeline ─────────────────────────────────
        let mut proposal = None;
        if self.arbiter.mode() == Mode::Autonomous {
            let scale = self.speed_scale();
            let lane_steer = ctx.filtered_error.map(|e| {
                let out = self.pid.update(e, dt);
                ctx.pid_output = Some(out);
                (out * scale).clamp(-1.0, 1.0)
            });

            let input = AvoidanceInput {
                obstacle,
                lane_steer,
                dt,
            };
            let out = self.avoidance.tick(&input, Some(probe));

            proposal = Some(AutonomousProposal {
                steer: out.steer,
                speed: out.speed,
                lane_error: ctx.filtered_error,
                hold: lane_steer.is_none() && out.phase == AvoidancePhase::Normal,
            });
            ctx.avoidance = Some(out);

            if let Some(limit) = self.disengage_after_lost_ticks {
                if self.lost_ticks >= limit {
                    if let Some(switch) = self.arbiter.force_manual(SwitchReason::LineLost) {
                        warn!("🛑 Lane lost for {} ticks: handing over", self.lost_ticks);
                        ctx.mode_switch = Some(switch);
                    }
                }
            }
        }

        ctx.command = self.arbiter.compose(&manual, proposal.as_ref(), dt);
        ctx.mode = self.arbiter.mode();
        ctx.phase = self.avoidance.phase();
        ctx.pid = self.pid.state();

        debug!(
            "tick {} [{}] angle={:+.2}° prop={:.2} brake={:.2}",
            tick,
            ctx.mode.as_str(),
            ctx.command.steering_angle,
            ctx.command.propulsion,
            ctx.command.brake
        );

        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avoidance::OpenRoad;
    use crate::types::Rgb;

    const DT: f32 = 0.02;
    const ROAD: Rgb = Rgb::new(0.2, 0.2, 0.22);

    /// 128 wide, markings in columns 20 and 100 → lane center 60.
    fn reference_frame() -> Frame {
        let mut frame = Frame::filled(128, 32, ROAD);
        for y in 22..32 {
            frame.set_pixel(20, y, Rgb::WHITE);
            frame.set_pixel(100, y, Rgb::WHITE);
        }
        frame
    }

    fn p_only_config() -> Config {
        let mut config = Config::default();
        config.pid.kp = 0.25;
        config.pid.ki = 0.0;
        config.pid.kd = 0.0;
        config.steering.smoothing_rate = 0.0;
        config
    }

    #[test]
    fn test_reference_frame_proportional_steering() {
        let mut controller = VehicleController::new(&p_only_config());
        let ctx = controller.tick(
            Some(reference_frame()),
            ObstacleSignal::clear(),
            ManualInput::idle(),
            &OpenRoad,
            DT,
        );
        assert_eq!(ctx.mode, Mode::Autonomous);
        assert_eq!(ctx.estimate.lane_center, Some(60.0));
        assert!((ctx.estimate.error.unwrap() - (-0.0625)).abs() < 1e-6);
        assert!((ctx.pid_output.unwrap() - (-0.015625)).abs() < 1e-6);
        assert!((ctx.command.steering_angle - (-0.015625 * 30.0)).abs() < 1e-4);
        assert!(ctx.degradations.is_empty());
    }

    #[test]
    fn test_no_frame_holds_steering_and_speed() {
        let mut controller = VehicleController::new(&Config::default());
        let first = controller.tick(
            Some(reference_frame()),
            ObstacleSignal::clear(),
            ManualInput::idle(),
            &OpenRoad,
            DT,
        );
        assert!(first.command.steering_angle < 0.0);

        for _ in 0..3 {
            let held =
                controller.tick(None, ObstacleSignal::clear(), ManualInput::idle(), &OpenRoad, DT);
            assert!(held.has(Degradation::NoFrame));
            assert!(held.is_holding());
            assert_eq!(held.command.steering_angle, first.command.steering_angle);
            assert_eq!(held.command.propulsion, first.command.propulsion);
            assert_eq!(held.pid, first.pid);
        }
    }

    #[test]
    fn test_no_detection_holds_steering_with_default_smoothing() {
        let mut controller = VehicleController::new(&Config::default());
        let mut last = controller.tick(
            Some(reference_frame()),
            ObstacleSignal::clear(),
            ManualInput::idle(),
            &OpenRoad,
            DT,
        );
        for _ in 0..4 {
            last = controller.tick(
                Some(reference_frame()),
                ObstacleSignal::clear(),
                ManualInput::idle(),
                &OpenRoad,
                DT,
            );
        }

        let blank = Frame::filled(128, 32, ROAD);
        for _ in 0..3 {
            let held = controller.tick(
                Some(blank.clone()),
                ObstacleSignal::clear(),
                ManualInput::idle(),
                &OpenRoad,
                DT,
            );
            assert!(held.has(Degradation::NoDetection));
            assert_eq!(held.command.steering_angle, last.command.steering_angle);
            assert_eq!(held.command.propulsion, last.command.propulsion);
        }
    }

    #[test]
    fn test_blank_frame_reports_no_detection() {
        let mut controller = VehicleController::new(&Config::default());
        let ctx = controller.tick(
            Some(Frame::filled(64, 16, ROAD)),
            ObstacleSignal::clear(),
            ManualInput::idle(),
            &OpenRoad,
            DT,
        );
        assert!(ctx.has(Degradation::NoDetection));
        assert_eq!(ctx.lost_ticks, 1);
        assert!(ctx.pid_output.is_none());

        let ctx = controller.tick(
            Some(reference_frame()),
            ObstacleSignal::clear(),
            ManualInput::idle(),
            &OpenRoad,
            DT,
        );
        assert_eq!(ctx.reacquired_after, Some(1));
        assert_eq!(ctx.lost_ticks, 0);
    }

    #[test]
    fn test_mode_toggle_preserves_pid_and_avoidance() {
        let mut controller = VehicleController::new(&Config::default());
        let frame = reference_frame();

        for _ in 0..3 {
            controller.tick(
                Some(frame.clone()),
                ObstacleSignal::clear(),
                ManualInput::idle(),
                &OpenRoad,
                DT,
            );
        }
        controller.tick(
            Some(frame.clone()),
            ObstacleSignal::detected(0.6),
            ManualInput::idle(),
            &OpenRoad,
            DT,
        );
        assert_eq!(controller.phase(), AvoidancePhase::Avoiding);

        let pid_before = controller.pid_state();
        let avoid_before = controller.avoidance_state();

        let ctx = controller.tick(
            Some(frame.clone()),
            ObstacleSignal::clear(),
            ManualInput::toggle(),
            &OpenRoad,
            DT,
        );
        assert_eq!(ctx.mode, Mode::Manual);
        for _ in 0..20 {
            let ctx = controller.tick(
                Some(frame.clone()),
                ObstacleSignal::clear(),
                ManualInput {
                    steer: 0.3,
                    throttle: 0.5,
                    ..ManualInput::idle()
                },
                &OpenRoad,
                DT,
            );
            assert!((ctx.command.steering_angle - 9.0).abs() < 1e-4);
            assert!(ctx.pid_output.is_none());
        }
        assert_eq!(controller.pid_state(), pid_before);
        assert_eq!(controller.avoidance_state(), avoid_before);

        let ctx = controller.tick(
            Some(frame),
            ObstacleSignal::clear(),
            ManualInput::toggle(),
            &OpenRoad,
            DT,
        );
        assert_eq!(ctx.mode, Mode::Autonomous);
        assert_eq!(ctx.phase, AvoidancePhase::Avoiding);
    }

    #[test]
    fn test_manual_input_overrides_autonomy() {
        let mut controller = VehicleController::new(&Config::default());
        let ctx = controller.tick(
            Some(reference_frame()),
            ObstacleSignal::clear(),
            ManualInput {
                steer: -1.0,
                ..ManualInput::idle()
            },
            &OpenRoad,
            DT,
        );
        assert_eq!(ctx.mode, Mode::Manual);
        assert_eq!(ctx.command.steering_angle, -30.0);
        assert!(ctx.mode_switch.is_some());
    }

    #[test]
    fn test_lost_line_hands_over_after_limit() {
        let mut config = Config::default();
        config.run.disengage_after_lost_ticks = Some(3);
        let mut controller = VehicleController::new(&config);
        let blank = Frame::filled(64, 16, ROAD);

        let mut switched_at = None;
        for i in 0..5 {
            let ctx = controller.tick(
                Some(blank.clone()),
                ObstacleSignal::clear(),
                ManualInput::idle(),
                &OpenRoad,
                DT,
            );
            if ctx.mode_switch.is_some() && switched_at.is_none() {
                switched_at = Some(i);
            }
        }
        assert_eq!(switched_at, Some(2));
        assert_eq!(controller.mode(), Mode::Manual);
    }

    #[test]
    fn test_high_speed_scale_reduces_steering() {
        let mut config = p_only_config();
        config.steering.high_speed_scale = 0.5;
        config.steering.scale_reference_speed = 0.8;
        let mut slow = VehicleController::new(&config);
        let first = slow.tick(
            Some(reference_frame()),
            ObstacleSignal::clear(),
            ManualInput::idle(),
            &OpenRoad,
            DT,
        );
        // Speed is zero on the first tick, so no scaling yet
        assert!((first.command.steering_angle - (-0.015625 * 30.0)).abs() < 1e-4);

        let mut last = first;
        for _ in 0..200 {
            last = slow.tick(
                Some(reference_frame()),
                ObstacleSignal::clear(),
                ManualInput::idle(),
                &OpenRoad,
                DT,
            );
        }
        assert!((last.command.propulsion - 0.8).abs() < 1e-4);
        assert!((last.command.steering_angle - (-0.015625 * 30.0 * 0.5)).abs() < 1e-4);
    }
}
