// src/config.rs
//
// Tunable parameters for every stage of the control loop. Loaded from YAML;
// any section or field left out falls back to its default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ControlError;
use crate::pid::DerivativeForm;
use crate::sim::SimConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub estimator: EstimatorConfig,
    pub filter: FilterConfig,
    pub pid: PidConfig,
    pub steering: SteeringConfig,
    pub avoidance: AvoidanceConfig,
    pub probe: ProbeConfig,
    pub speed: SpeedConfig,
    pub manual: ManualConfig,
    pub obstacle: ObstacleConfig,
    pub run: RunConfig,
    pub sim: SimConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Number of rows at the bottom of the frame to scan
    pub scan_rows: usize,
    /// Mean channel value a marking pixel must exceed
    pub brightness_threshold: f32,
    /// Max-minus-min channel spread a marking pixel must stay below
    pub saturation_threshold: f32,
    pub left_weight: f32,
    pub right_weight: f32,
    /// Offset (fraction of frame width) used to infer a missing side
    pub single_side_offset: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            scan_rows: 10,
            brightness_threshold: 0.5,
            saturation_threshold: 0.3,
            left_weight: 0.5,
            right_weight: 0.5,
            single_side_offset: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Moving-average window over lane errors (1 = pass-through)
    pub window: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { window: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub output_limit: f32,
    pub integral_limit: f32,
    /// Zero the integral whenever the error changes sign
    pub reset_on_sign_change: bool,
    pub derivative: DerivativeForm,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.25,
            ki: 0.006,
            kd: 2.0,
            output_limit: 1.0,
            integral_limit: 30.0,
            reset_on_sign_change: true,
            derivative: DerivativeForm::PerTick,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub max_steering_angle_deg: f32,
    /// Exponential smoothing rate (1/s); <= 0 applies targets instantly
    pub smoothing_rate: f32,
    /// Largest normalized steering change per tick, if any
    pub max_step: Option<f32>,
    /// Steering scale reached at `scale_reference_speed` (1.0 disables)
    pub high_speed_scale: f32,
    pub scale_reference_speed: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_steering_angle_deg: 30.0,
            smoothing_rate: 8.0,
            max_step: None,
            high_speed_scale: 1.0,
            scale_reference_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    /// Seconds spent avoiding once the obstacle clears
    pub avoidance_duration: f32,
    /// Seconds spent blending back to lane following
    pub recovery_duration: f32,
    /// Fraction of the stored correction mirrored during recovery
    pub recovery_factor: f32,
    pub blend_line_start: f32,
    pub blend_obstacle_start: f32,
    /// Normalized steering used when a probe aborts the recovery
    pub hard_correction: f32,
    /// Seconds of recovery guaranteed after a probe abort
    pub min_recovery_time: f32,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            avoidance_duration: 1.0,
            recovery_duration: 1.5,
            recovery_factor: 0.5,
            blend_line_start: 0.3,
            blend_obstacle_start: 0.7,
            hard_correction: 0.8,
            min_recovery_time: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,
    pub cone_angle_deg: f32,
    pub max_distance: f32,
    /// A probe hit closer than this aborts the gentle recovery
    pub collision_check_distance: f32,
    pub origin_forward: f32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cone_angle_deg: 20.0,
            max_distance: 15.0,
            collision_check_distance: 4.0,
            origin_forward: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub max_speed: f32,
    /// Propulsion added per autonomous tick while the road is clear
    pub ramp_increment: f32,
    pub avoidance_speed: f32,
    pub recovery_speed: f32,
    pub curve_slowdown: bool,
    pub moderate_turn_error: f32,
    pub moderate_turn_speed: f32,
    pub sharp_turn_error: f32,
    pub sharp_turn_speed: f32,
    /// Brake applied while the lane is lost
    pub line_lost_brake: f32,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            max_speed: 0.8,
            ramp_increment: 0.01,
            avoidance_speed: 0.35,
            recovery_speed: 0.5,
            curve_slowdown: false,
            moderate_turn_error: 0.1,
            moderate_turn_speed: 0.6,
            sharp_turn_error: 0.25,
            sharp_turn_speed: 0.4,
            line_lost_brake: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualConfig {
    pub accelerate_per_sec: f32,
    pub decelerate_per_sec: f32,
    pub brake_apply_per_sec: f32,
    pub brake_release_per_sec: f32,
    /// Axis magnitude above which manual input overrides autonomy
    pub override_deadzone: f32,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            accelerate_per_sec: 0.8,
            decelerate_per_sec: 1.2,
            brake_apply_per_sec: 3.0,
            brake_release_per_sec: 4.0,
            override_deadzone: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    /// Correction magnitude suggested by the trigger zone
    pub steer_magnitude: f32,
    /// Lateral offset under which an obstacle counts as dead ahead
    pub center_tolerance: f32,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            steer_magnitude: 0.6,
            center_tolerance: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub tick_hz: f32,
    pub realtime: bool,
    pub max_ticks: u64,
    /// Hand control back after this many consecutive lost-line ticks
    pub disengage_after_lost_ticks: Option<u32>,
    /// Optional directory of recorded frames to replay
    pub frames_dir: Option<String>,
    pub event_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tick_hz: 50.0,
            realtime: false,
            max_ticks: 1500,
            disengage_after_lost_ticks: None,
            frames_dir: None,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "lane_pilot=info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_yaml(&contents)?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents).map_err(ControlError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.run.tick_hz
    }

    /// Reject values that would make the controller misbehave silently.
    pub fn validate(&self) -> std::result::Result<(), ControlError> {
        let e = &self.estimator;
        if e.scan_rows == 0 {
            return invalid("estimator.scan_rows must be at least 1");
        }
        unit_range("estimator.brightness_threshold", e.brightness_threshold)?;
        unit_range("estimator.saturation_threshold", e.saturation_threshold)?;
        if e.left_weight < 0.0 || e.right_weight < 0.0 || e.left_weight + e.right_weight <= 0.0 {
            return invalid("estimator weights must be non-negative and not both zero");
        }
        unit_range("estimator.single_side_offset", e.single_side_offset)?;

        if self.filter.window == 0 {
            return invalid("filter.window must be at least 1");
        }

        let p = &self.pid;
        if p.output_limit <= 0.0 || p.integral_limit <= 0.0 {
            return invalid("pid limits must be positive");
        }

        let s = &self.steering;
        if s.max_steering_angle_deg <= 0.0 {
            return invalid("steering.max_steering_angle_deg must be positive");
        }
        if let Some(step) = s.max_step {
            if step <= 0.0 {
                return invalid("steering.max_step must be positive when set");
            }
        }
        unit_range("steering.high_speed_scale", s.high_speed_scale)?;
        if s.scale_reference_speed <= 0.0 {
            return invalid("steering.scale_reference_speed must be positive");
        }

        let a = &self.avoidance;
        if a.avoidance_duration <= 0.0 || a.recovery_duration <= 0.0 {
            return invalid("avoidance durations must be positive");
        }
        if a.min_recovery_time < 0.0 {
            return invalid("avoidance.min_recovery_time must not be negative");
        }
        unit_range("avoidance.blend_line_start", a.blend_line_start)?;
        unit_range("avoidance.blend_obstacle_start", a.blend_obstacle_start)?;
        unit_range("avoidance.hard_correction", a.hard_correction)?;

        let pr = &self.probe;
        if pr.max_distance <= 0.0 || pr.collision_check_distance <= 0.0 {
            return invalid("probe distances must be positive");
        }

        let sp = &self.speed;
        for (name, v) in [
            ("speed.max_speed", sp.max_speed),
            ("speed.avoidance_speed", sp.avoidance_speed),
            ("speed.recovery_speed", sp.recovery_speed),
            ("speed.moderate_turn_speed", sp.moderate_turn_speed),
            ("speed.sharp_turn_speed", sp.sharp_turn_speed),
            ("speed.line_lost_brake", sp.line_lost_brake),
        ] {
            unit_range(name, v)?;
        }
        if sp.ramp_increment <= 0.0 {
            return invalid("speed.ramp_increment must be positive");
        }

        let m = &self.manual;
        if m.accelerate_per_sec <= 0.0
            || m.decelerate_per_sec <= 0.0
            || m.brake_apply_per_sec <= 0.0
            || m.brake_release_per_sec <= 0.0
        {
            return invalid("manual ramp rates must be positive");
        }
        unit_range("manual.override_deadzone", m.override_deadzone)?;

        if self.run.tick_hz <= 0.0 {
            return invalid("run.tick_hz must be positive");
        }
        if self.run.event_capacity == 0 {
            return invalid("run.event_capacity must be at least 1");
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> std::result::Result<(), ControlError> {
    Err(ControlError::InvalidConfig(msg.to_string()))
}

fn unit_range(name: &str, value: f32) -> std::result::Result<(), ControlError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ControlError::InvalidConfig(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = Config::from_yaml("pid:\n  kp: 0.4\navoidance:\n  recovery_duration: 2.0\n")
            .unwrap();
        assert_eq!(config.pid.kp, 0.4);
        assert_eq!(config.pid.kd, 2.0);
        assert_eq!(config.avoidance.recovery_duration, 2.0);
        assert_eq!(config.estimator.scan_rows, 10);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.avoidance.avoidance_duration = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ControlError::InvalidConfig(_))
        ));

        let mut config = Config::default();
        config.estimator.brightness_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.estimator.left_weight = 0.0;
        config.estimator.right_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "run:\n  tick_hz: 20.0\n  max_ticks: 10").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.run.max_ticks, 10);
        assert!((config.tick_seconds() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::load("/nonexistent/lane-pilot.yaml").is_err());
    }

    #[test]
    fn test_shipped_config_any_input_overrides() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.yaml");
        let config = Config::load(path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.manual.override_deadzone, 0.0);
        assert_eq!(
            config.manual.override_deadzone,
            ManualConfig::default().override_deadzone
        );
    }
}
