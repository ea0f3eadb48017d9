// src/pid.rs
//
// Steering PID. One instance per actuated axis; nothing is shared between
// instances. Output is clamped to ±output_limit and scaled to a wheel angle
// by the caller.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PidConfig;

/// How the derivative and integral terms treat time. Fixed per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeForm {
    /// `d = e - e_prev`, `i += e`
    #[default]
    PerTick,
    /// `d = (e - e_prev) / dt`, `i += e * dt`
    PerSecond,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Everything `update` reads or writes, gains included.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PidState {
    pub integral: f32,
    pub last_error: f32,
    pub gains: PidGains,
}

#[derive(Debug, Clone)]
pub struct PidController {
    state: PidState,
    output_limit: f32,
    integral_limit: f32,
    reset_on_sign_change: bool,
    form: DerivativeForm,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            state: PidState {
                gains,
                ..PidState::default()
            },
            output_limit: 1.0,
            integral_limit: f32::INFINITY,
            reset_on_sign_change: true,
            form: DerivativeForm::PerTick,
        }
    }

    pub fn from_config(config: &PidConfig) -> Self {
        let gains = PidGains {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
        };
        Self {
            state: PidState {
                gains,
                ..PidState::default()
            },
            output_limit: config.output_limit,
            integral_limit: config.integral_limit,
            reset_on_sign_change: config.reset_on_sign_change,
            form: config.derivative,
        }
    }

    pub fn with_sign_change_reset(mut self, enabled: bool) -> Self {
        self.reset_on_sign_change = enabled;
        self
    }

    pub fn with_integral_limit(mut self, limit: f32) -> Self {
        self.integral_limit = limit;
        self
    }

    pub fn with_form(mut self, form: DerivativeForm) -> Self {
        self.form = form;
        self
    }

    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        if self.reset_on_sign_change
            && error.is_sign_negative() != self.state.last_error.is_sign_negative()
        {
            if self.state.integral != 0.0 {
                debug!(
                    "↩️  PID integral reset on zero-crossing ({:+.3} → {:+.3})",
                    self.state.last_error, error
                );
            }
            self.state.integral = 0.0;
        }

        let (derivative, integral_step) = match self.form {
            DerivativeForm::PerTick => (error - self.state.last_error, error),
            DerivativeForm::PerSecond if dt > 0.0 => {
                ((error - self.state.last_error) / dt, error * dt)
            }
            DerivativeForm::PerSecond => (0.0, 0.0),
        };

        self.state.integral = (self.state.integral + integral_step)
            .clamp(-self.integral_limit, self.integral_limit);
        self.state.last_error = error;

        let gains = self.state.gains;
        let output =
            gains.kp * error + gains.ki * self.state.integral + gains.kd * derivative;
        output.clamp(-self.output_limit, self.output_limit)
    }

    pub fn reset(&mut self) {
        self.state = PidState {
            gains: self.state.gains,
            ..PidState::default()
        };
    }

    pub fn state(&self) -> PidState {
        self.state
    }

    pub fn gains(&self) -> PidGains {
        self.state.gains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.02;

    #[test]
    fn test_proportional_first_call() {
        let mut pid = PidController::new(PidGains {
            kp: 0.25,
            ki: 0.0,
            kd: 0.0,
        });
        let out = pid.update(-0.0625, DT);
        assert!((out - (-0.015625)).abs() < 1e-7);
    }

    #[test]
    fn test_fresh_controllers_match() {
        let gains = PidGains {
            kp: 0.25,
            ki: 0.006,
            kd: 2.0,
        };
        let mut a = PidController::new(gains);
        let mut b = PidController::new(gains);
        let errors = [0.1, 0.3, -0.2, -0.05, 0.0, 0.4, 0.4, -0.9];
        let out_a: Vec<f32> = errors.iter().map(|&e| a.update(e, DT)).collect();
        let out_b: Vec<f32> = errors.iter().map(|&e| b.update(e, DT)).collect();
        assert_eq!(out_a, out_b);
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn test_integral_resets_on_sign_flip() {
        let gains = PidGains {
            kp: 0.25,
            ki: 0.1,
            kd: 0.5,
        };
        let mut guarded = PidController::new(gains);
        let mut baseline = PidController::new(gains).with_sign_change_reset(false);

        for e in [0.1, 0.2, 0.3, 0.4] {
            guarded.update(e, DT);
            baseline.update(e, DT);
        }
        assert!((guarded.state().integral - 1.0).abs() < 1e-6);

        let out_guarded = guarded.update(-0.1, DT);
        let out_baseline = baseline.update(-0.1, DT);

        assert!((guarded.state().integral - (-0.1)).abs() < 1e-6);
        assert!((baseline.state().integral - 0.9).abs() < 1e-6);
        // The stale positive integral keeps pushing the baseline the wrong way
        assert!(out_guarded < out_baseline);
    }

    #[test]
    fn test_first_negative_error_resets_fresh_integral() {
        let mut pid = PidController::new(PidGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
        });
        pid.update(-0.2, DT);
        pid.update(-0.2, DT);
        assert!((pid.state().integral - (-0.4)).abs() < 1e-6);
    }

    #[test]
    fn test_output_is_clamped() {
        let mut pid = PidController::new(PidGains {
            kp: 10.0,
            ki: 0.0,
            kd: 0.0,
        });
        assert_eq!(pid.update(0.5, DT), 1.0);
        assert_eq!(pid.update(-0.5, DT), -1.0);
    }

    #[test]
    fn test_integral_limit() {
        let mut pid = PidController::new(PidGains {
            kp: 0.0,
            ki: 0.01,
            kd: 0.0,
        })
        .with_integral_limit(2.0);
        for _ in 0..10 {
            pid.update(1.0, DT);
        }
        assert_eq!(pid.state().integral, 2.0);
    }

    #[test]
    fn test_per_second_form_scales_by_dt() {
        let mut pid = PidController::new(PidGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
        })
        .with_form(DerivativeForm::PerSecond);
        pid.update(0.5, 0.1);
        assert!((pid.state().integral - 0.05).abs() < 1e-6);

        let mut d = PidController::new(PidGains {
            kp: 0.0,
            ki: 0.0,
            kd: 1.0,
        })
        .with_form(DerivativeForm::PerSecond)
        .with_sign_change_reset(false);
        let out = d.update(0.05, 0.1);
        assert!((out - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut pid = PidController::new(PidGains {
            kp: 0.25,
            ki: 0.006,
            kd: 2.0,
        });
        pid.update(0.3, DT);
        pid.reset();
        let state = pid.state();
        assert_eq!(state.integral, 0.0);
        assert_eq!(state.last_error, 0.0);
        assert_eq!(state.gains, pid.gains());
    }

    #[test]
    fn test_state_carries_configured_gains() {
        let config = PidConfig::default();
        let pid = PidController::from_config(&config);
        let gains = pid.state().gains;
        assert_eq!((gains.kp, gains.ki, gains.kd), (config.kp, config.ki, config.kd));

        let json = serde_json::to_value(pid.state()).unwrap();
        assert_eq!(json["gains"]["kd"], serde_json::json!(config.kd));
    }
}
