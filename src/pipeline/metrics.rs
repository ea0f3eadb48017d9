// src/pipeline/metrics.rs
//
// Run counters. Cheap to clone and share with a reporting task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::Degradation;
use crate::types::Mode;

#[derive(Debug, Clone)]
pub struct ControlMetrics {
    pub total_ticks: Arc<AtomicU64>,
    pub autonomous_ticks: Arc<AtomicU64>,
    pub manual_ticks: Arc<AtomicU64>,
    pub lane_detected_ticks: Arc<AtomicU64>,
    pub no_frame_ticks: Arc<AtomicU64>,
    pub no_detection_ticks: Arc<AtomicU64>,
    pub sensor_conflicts: Arc<AtomicU64>,
    pub avoidance_engagements: Arc<AtomicU64>,
    pub recovery_aborts: Arc<AtomicU64>,
    pub mode_switches: Arc<AtomicU64>,
    pub tick_time_us: Arc<AtomicU64>,
    /// Sum of |error| over detected ticks, in micro-units
    abs_error_micro: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for ControlMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlMetrics {
    pub fn new() -> Self {
        Self {
            total_ticks: Arc::new(AtomicU64::new(0)),
            autonomous_ticks: Arc::new(AtomicU64::new(0)),
            manual_ticks: Arc::new(AtomicU64::new(0)),
            lane_detected_ticks: Arc::new(AtomicU64::new(0)),
            no_frame_ticks: Arc::new(AtomicU64::new(0)),
            no_detection_ticks: Arc::new(AtomicU64::new(0)),
            sensor_conflicts: Arc::new(AtomicU64::new(0)),
            avoidance_engagements: Arc::new(AtomicU64::new(0)),
            recovery_aborts: Arc::new(AtomicU64::new(0)),
            mode_switches: Arc::new(AtomicU64::new(0)),
            tick_time_us: Arc::new(AtomicU64::new(0)),
            abs_error_micro: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn record_mode(&self, mode: Mode) {
        match mode {
            Mode::Autonomous => self.inc(&self.autonomous_ticks),
            Mode::Manual => self.inc(&self.manual_ticks),
        }
    }

    pub fn record_degradation(&self, degradation: Degradation) {
        match degradation {
            Degradation::NoFrame => self.inc(&self.no_frame_ticks),
            Degradation::NoDetection => self.inc(&self.no_detection_ticks),
            Degradation::SensorConflict => self.inc(&self.sensor_conflicts),
        }
    }

    pub fn record_error(&self, error: f32) {
        self.inc(&self.lane_detected_ticks);
        let micro = (error.abs() as f64 * 1e6) as u64;
        self.abs_error_micro.fetch_add(micro, Ordering::Relaxed);
    }

    pub fn mean_abs_error(&self) -> f64 {
        let n = self.lane_detected_ticks.load(Ordering::Relaxed);
        if n == 0 {
            return 0.0;
        }
        self.abs_error_micro.load(Ordering::Relaxed) as f64 / 1e6 / n as f64
    }

    pub fn summary(&self) -> MetricsSummary {
        let total = self.total_ticks.load(Ordering::Relaxed);
        let detected = self.lane_detected_ticks.load(Ordering::Relaxed);
        MetricsSummary {
            total_ticks: total,
            autonomous_ticks: self.autonomous_ticks.load(Ordering::Relaxed),
            manual_ticks: self.manual_ticks.load(Ordering::Relaxed),
            detection_rate: if total > 0 {
                detected as f64 / total as f64
            } else {
                0.0
            },
            mean_abs_error: self.mean_abs_error(),
            no_frame_ticks: self.no_frame_ticks.load(Ordering::Relaxed),
            no_detection_ticks: self.no_detection_ticks.load(Ordering::Relaxed),
            sensor_conflicts: self.sensor_conflicts.load(Ordering::Relaxed),
            avoidance_engagements: self.avoidance_engagements.load(Ordering::Relaxed),
            recovery_aborts: self.recovery_aborts.load(Ordering::Relaxed),
            mode_switches: self.mode_switches.load(Ordering::Relaxed),
            last_tick_us: self.tick_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_ticks: u64,
    pub autonomous_ticks: u64,
    pub manual_ticks: u64,
    pub detection_rate: f64,
    pub mean_abs_error: f64,
    pub no_frame_ticks: u64,
    pub no_detection_ticks: u64,
    pub sensor_conflicts: u64,
    pub avoidance_engagements: u64,
    pub recovery_aborts: u64,
    pub mode_switches: u64,
    pub last_tick_us: u64,
    pub elapsed_secs: f64,
}
