// src/smoother.rs

use std::collections::VecDeque;

/// Sliding-window mean over recent lane errors.
///
/// A lost line clears the window so the next detection is not averaged with
/// stale values from before the gap.
pub struct ErrorFilter {
    history: VecDeque<f32>,
    window_size: usize,
}

impl ErrorFilter {
    /// Create a new filter with the given window size (1 = pass-through)
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            history: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Add a measurement and return the window mean.
    pub fn push(&mut self, error: f32) -> f32 {
        self.history.push_back(error);
        if self.history.len() > self.window_size {
            self.history.pop_front();
        }
        self.history.iter().sum::<f32>() / self.history.len() as f32
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn history_size(&self) -> usize {
        self.history.len()
    }
}

/// Moves the applied steering toward its target by exponential interpolation
/// instead of jumping, with an optional hard cap on per-tick change.
#[derive(Debug, Clone)]
pub struct SteeringSmoother {
    rate: f32,
    max_step: Option<f32>,
    current: f32,
}

impl SteeringSmoother {
    pub fn new(rate: f32, max_step: Option<f32>) -> Self {
        Self {
            rate,
            max_step,
            current: 0.0,
        }
    }

    pub fn step(&mut self, target: f32, dt: f32) -> f32 {
        let alpha = if self.rate <= 0.0 {
            1.0
        } else {
            1.0 - (-self.rate * dt.max(0.0)).exp()
        };
        let mut delta = (target - self.current) * alpha;
        if let Some(max) = self.max_step {
            delta = delta.clamp(-max, max);
        }
        self.current = (self.current + delta).clamp(-1.0, 1.0);
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_window_mean() {
        let mut filter = ErrorFilter::new(3);
        assert_eq!(filter.push(0.3), 0.3);
        assert!((filter.push(0.1) - 0.2).abs() < 1e-6);
        assert!((filter.push(-0.1) - 0.1).abs() < 1e-6);
        // 0.3 falls out of the window
        assert!((filter.push(0.3) - 0.1).abs() < 1e-6);
        assert_eq!(filter.history_size(), 3);
    }

    #[test]
    fn test_filter_window_one_is_pass_through() {
        let mut filter = ErrorFilter::new(1);
        filter.push(0.9);
        assert_eq!(filter.push(-0.4), -0.4);
    }

    #[test]
    fn test_filter_clear_drops_history() {
        let mut filter = ErrorFilter::new(4);
        filter.push(1.0);
        filter.push(1.0);
        filter.clear();
        assert_eq!(filter.push(-0.5), -0.5);
    }

    #[test]
    fn test_smoother_approaches_target_without_overshoot() {
        let mut smoother = SteeringSmoother::new(5.0, None);
        let mut last = 0.0;
        for _ in 0..50 {
            let v = smoother.step(0.8, 0.02);
            assert!(v >= last && v <= 0.8);
            last = v;
        }
        assert!((last - 0.8).abs() < 0.01);
    }

    #[test]
    fn test_smoother_first_step_fraction() {
        let mut smoother = SteeringSmoother::new(10.0, None);
        let v = smoother.step(1.0, 0.1);
        let expected = 1.0 - (-1.0f32).exp();
        assert!((v - expected).abs() < 1e-5);
    }

    #[test]
    fn test_non_positive_rate_is_instant() {
        let mut smoother = SteeringSmoother::new(0.0, None);
        assert_eq!(smoother.step(-0.6, 0.02), -0.6);
    }

    #[test]
    fn test_reset_returns_to_straight() {
        let mut smoother = SteeringSmoother::new(0.0, None);
        smoother.step(0.7, 0.02);
        smoother.reset();
        assert_eq!(smoother.current(), 0.0);
    }

    #[test]
    fn test_max_step_caps_change() {
        let mut smoother = SteeringSmoother::new(0.0, Some(0.1));
        assert!((smoother.step(1.0, 0.02) - 0.1).abs() < 1e-6);
        assert!((smoother.step(1.0, 0.02) - 0.2).abs() < 1e-6);
    }
}
