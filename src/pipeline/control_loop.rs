// src/pipeline/control_loop.rs
//
// Fixed-rate loop wiring the boundary traits to the controller. Each step:
// capture, delay through the latency stage, read obstacles and driver
// input, tick the controller, actuate, then record metrics and events.

use std::time::Instant;

use tracing::{debug, info};

use crate::avoidance::CollisionProbe;
use crate::config::Config;
use crate::error::{ControlError, Degradation, Result};
use crate::interface::{ActuationSink, FrameSource, ManualInputSource};
use crate::obstacle::ObstacleMonitor;
use crate::types::Vec2;

use super::controller::VehicleController;
use super::event_bus::{ControlEvent, EventBus};
use super::latency::FrameStage;
use super::metrics::ControlMetrics;
use super::tick_context::TickContext;
use crate::avoidance::AvoidanceTransition;

/// Lets the controller cast rays through the obstacle monitor.
struct MonitorProbe<'a>(&'a dyn ObstacleMonitor);

impl CollisionProbe for MonitorProbe<'_> {
    fn probe(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> f32 {
        self.0.probe(origin, direction, max_distance)
    }
}

pub struct ControlLoop {
    source: Box<dyn FrameSource>,
    monitor: Box<dyn ObstacleMonitor>,
    input: Box<dyn ManualInputSource>,
    sink: Box<dyn ActuationSink>,
    controller: VehicleController,
    stage: FrameStage,
    metrics: ControlMetrics,
    events: EventBus,
    dt: f32,
    tick: u64,
}

#[derive(Default)]
pub struct ControlLoopBuilder {
    config: Option<Config>,
    source: Option<Box<dyn FrameSource>>,
    monitor: Option<Box<dyn ObstacleMonitor>>,
    input: Option<Box<dyn ManualInputSource>>,
    sink: Option<Box<dyn ActuationSink>>,
}

impl ControlLoopBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn frame_source(mut self, source: impl FrameSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn obstacle_monitor(mut self, monitor: impl ObstacleMonitor + 'static) -> Self {
        self.monitor = Some(Box::new(monitor));
        self
    }

    pub fn manual_input(mut self, input: impl ManualInputSource + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    pub fn actuation_sink(mut self, sink: impl ActuationSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> Result<ControlLoop> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let source = self.source.ok_or(ControlError::MissingWiring("frame source"))?;
        let monitor = self
            .monitor
            .ok_or(ControlError::MissingWiring("obstacle monitor"))?;
        let input = self.input.ok_or(ControlError::MissingWiring("manual input"))?;
        let sink = self.sink.ok_or(ControlError::MissingWiring("actuation sink"))?;

        info!(
            "✓ Control loop ready: {:.0} Hz, kp={} ki={} kd={}",
            config.run.tick_hz, config.pid.kp, config.pid.ki, config.pid.kd
        );

        Ok(ControlLoop {
            source,
            monitor,
            input,
            sink,
            controller: VehicleController::new(&config),
            stage: FrameStage::new(),
            metrics: ControlMetrics::new(),
            events: EventBus::new(config.run.event_capacity),
            dt: config.tick_seconds(),
            tick: 0,
        })
    }
}

impl ControlLoop {
    pub fn builder() -> ControlLoopBuilder {
        ControlLoopBuilder::default()
    }

    pub fn step(&mut self) -> TickContext {
        let started = Instant::now();
        let tick = self.tick;
        self.tick += 1;

        let captured = self.source.capture().map(|f| f.with_tick(tick));
        let frame = self.stage.advance(captured);
        let obstacle = self.monitor.signal();
        let conflict = obstacle.detected && self.monitor.sensor_conflict();
        let manual = self.input.poll();

        let probe = MonitorProbe(self.monitor.as_ref());
        let mut ctx = self
            .controller
            .tick(frame, obstacle, manual, &probe, self.dt);
        if conflict {
            ctx.degrade(Degradation::SensorConflict);
        }

        self.sink.apply(ctx.command);

        self.record(&ctx);
        self.metrics
            .set_timing(&self.metrics.tick_time_us, started.elapsed().as_micros() as u64);

        ctx
    }

    /// Run `ticks` steps back to back.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
        debug!("Ran {} ticks", ticks);
    }

    fn record(&mut self, ctx: &TickContext) {
        let m = &self.metrics;
        m.inc(&m.total_ticks);
        m.record_mode(ctx.mode);
        if let Some(error) = ctx.estimate.error {
            m.record_error(error);
        }
        for d in &ctx.degradations {
            m.record_degradation(*d);
        }

        if let Some(switch) = ctx.mode_switch {
            m.inc(&m.mode_switches);
            self.events.publish(ControlEvent::ModeChanged {
                tick: ctx.tick,
                switch,
            });
        }

        if let Some(transition) = ctx.avoidance.and_then(|a| a.transition) {
            match transition {
                AvoidanceTransition::Engaged { .. } | AvoidanceTransition::Reengaged { .. } => {
                    m.inc(&m.avoidance_engagements)
                }
                AvoidanceTransition::RecoveryAborted { .. } => m.inc(&m.recovery_aborts),
                _ => {}
            }
            self.events.publish(ControlEvent::Avoidance {
                tick: ctx.tick,
                transition,
            });
        }

        if ctx.lost_ticks == 1 && ctx.has(Degradation::NoDetection) {
            self.events.publish(ControlEvent::LineLost { tick: ctx.tick });
        }
        if let Some(lost_ticks) = ctx.reacquired_after {
            self.events.publish(ControlEvent::LineReacquired {
                tick: ctx.tick,
                lost_ticks,
            });
        }
        if ctx.has(Degradation::SensorConflict) {
            self.events.publish(ControlEvent::SensorConflict { tick: ctx.tick });
        }
    }

    pub fn metrics(&self) -> &ControlMetrics {
        &self.metrics
    }

    pub fn drain_events(&mut self) -> Vec<ControlEvent> {
        self.events.drain()
    }

    pub fn controller(&self) -> &VehicleController {
        &self.controller
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{CommandLog, NoDriver};
    use crate::types::{Frame, ObstacleSignal, Rgb};

    struct StillCamera;

    impl FrameSource for StillCamera {
        fn capture(&mut self) -> Option<Frame> {
            let mut frame = Frame::filled(64, 16, Rgb::gray(0.1));
            for y in 6..16 {
                frame.set_pixel(10, y, Rgb::WHITE);
                frame.set_pixel(54, y, Rgb::WHITE);
            }
            Some(frame)
        }
    }

    struct Clear;

    impl CollisionProbe for Clear {
        fn probe(&self, _o: Vec2, _d: Vec2, _m: f32) -> f32 {
            f32::INFINITY
        }
    }

    impl ObstacleMonitor for Clear {
        fn signal(&mut self) -> ObstacleSignal {
            ObstacleSignal::clear()
        }
    }

    #[test]
    fn test_missing_wiring_is_reported() {
        let err = ControlLoop::builder()
            .frame_source(StillCamera)
            .manual_input(NoDriver)
            .actuation_sink(CommandLog::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ControlError::MissingWiring("obstacle monitor")));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.run.tick_hz = 0.0;
        let result = ControlLoop::builder()
            .config(config)
            .frame_source(StillCamera)
            .obstacle_monitor(Clear)
            .manual_input(NoDriver)
            .actuation_sink(CommandLog::default())
            .build();
        assert!(matches!(result, Err(ControlError::InvalidConfig(_))));
    }

    #[test]
    fn test_first_tick_has_no_frame_then_uses_previous_capture() {
        let mut control = ControlLoop::builder()
            .frame_source(StillCamera)
            .obstacle_monitor(Clear)
            .manual_input(NoDriver)
            .actuation_sink(CommandLog::default())
            .build()
            .unwrap();

        let first = control.step();
        assert!(first.has(Degradation::NoFrame));
        assert!(first.frame_tick.is_none());

        let second = control.step();
        assert_eq!(second.tick, 1);
        assert_eq!(second.frame_tick, Some(0));
        assert!(second.estimate.is_detected());

        let summary = control.metrics().summary();
        assert_eq!(summary.total_ticks, 2);
        assert_eq!(summary.no_frame_ticks, 1);
    }
}
