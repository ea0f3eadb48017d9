// src/lane_detection.rs
//
// Reduces a camera frame to one normalized lateral error.
//
// Marking pixels are "light and achromatic": mean channel above the
// brightness threshold and channel spread below the saturation threshold.
// Hits are split at the frame's horizontal center; each side is averaged
// independently and the lane center is a weighted mix of the two. When only
// one side is visible the other is inferred by a fixed fraction of the
// frame width.

use tracing::debug;

use crate::config::EstimatorConfig;
use crate::types::{Frame, LaneEstimate, Rgb};

// ============================================================================
// SCAN REGION
// ============================================================================

/// Horizontal band of rows `[row_start, row_end)` scanned across all columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRegion {
    pub row_start: usize,
    pub row_end: usize,
}

impl ScanRegion {
    pub fn new(row_start: usize, row_end: usize) -> Self {
        Self { row_start, row_end }
    }

    /// The `rows` rows nearest the vehicle (bottom of the image).
    pub fn bottom_band(frame_height: usize, rows: usize) -> Self {
        Self {
            row_start: frame_height.saturating_sub(rows),
            row_end: frame_height,
        }
    }

    fn clipped(&self, frame_height: usize) -> (usize, usize) {
        let end = self.row_end.min(frame_height);
        (self.row_start.min(end), end)
    }
}

// ============================================================================
// ESTIMATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct LaneEstimator {
    config: EstimatorConfig,
}

#[derive(Default)]
struct SideAccumulator {
    sum: f64,
    count: usize,
}

impl SideAccumulator {
    fn push(&mut self, x: usize) {
        self.sum += x as f64;
        self.count += 1;
    }

    fn mean(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }
}

impl LaneEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Default region for a frame: the configured bottom band.
    pub fn default_region(&self, frame: &Frame) -> ScanRegion {
        ScanRegion::bottom_band(frame.height(), self.config.scan_rows)
    }

    #[inline]
    pub fn is_marking(&self, pixel: &Rgb) -> bool {
        pixel.intensity() > self.config.brightness_threshold
            && pixel.saturation() < self.config.saturation_threshold
    }

    pub fn estimate(&self, frame: &Frame, region: ScanRegion) -> LaneEstimate {
        let width = frame.width();
        let center_x = width as f32 / 2.0;
        let (row_start, row_end) = region.clipped(frame.height());

        let mut left = SideAccumulator::default();
        let mut right = SideAccumulator::default();

        for y in row_start..row_end {
            for (x, pixel) in frame.row(y).iter().enumerate() {
                if !self.is_marking(pixel) {
                    continue;
                }
                if (x as f32) < center_x {
                    left.push(x);
                } else {
                    right.push(x);
                }
            }
        }

        let offset = self.config.single_side_offset * width as f32;
        let lane_center = match (left.mean(), right.mean()) {
            (Some(l), Some(r)) => {
                let wl = self.config.left_weight;
                let wr = self.config.right_weight;
                Some((wl * l + wr * r) / (wl + wr))
            }
            (Some(l), None) => Some(l + offset),
            (None, Some(r)) => Some(r - offset),
            (None, None) => None,
        };

        let error = lane_center.map(|c| (c - center_x) / center_x);

        match error {
            Some(err) => debug!(
                "🛣️  Lane estimate: center={:.1} error={:+.3} (L={} R={})",
                lane_center.unwrap_or(center_x),
                err,
                left.count,
                right.count
            ),
            None => debug!("🛣️  No lane pixels in rows {}..{}", row_start, row_end),
        }

        LaneEstimate {
            error,
            lane_center,
            left_count: left.count,
            right_count: right.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROAD: Rgb = Rgb::new(0.2, 0.2, 0.22);

    fn road_frame(width: usize, height: usize) -> Frame {
        Frame::filled(width, height, ROAD)
    }

    fn paint_columns(frame: &mut Frame, columns: &[usize], rows: std::ops::Range<usize>) {
        for y in rows {
            for &x in columns {
                frame.set_pixel(x, y, Rgb::gray(0.95));
            }
        }
    }

    fn estimator() -> LaneEstimator {
        LaneEstimator::new(EstimatorConfig::default())
    }

    #[test]
    fn test_no_markings_is_no_detection() {
        let est = estimator();
        let frame = road_frame(64, 48);
        let result = est.estimate(&frame, est.default_region(&frame));
        assert_eq!(result, LaneEstimate::no_detection());
        assert!(!result.is_detected());
    }

    #[test]
    fn test_colored_pixels_are_not_markings() {
        let est = estimator();
        let mut frame = road_frame(64, 48);
        // Bright yellow: intensity passes, saturation fails
        for y in 38..48 {
            frame.set_pixel(10, y, Rgb::new(1.0, 0.9, 0.1));
        }
        // Dim gray: achromatic but too dark
        for y in 38..48 {
            frame.set_pixel(50, y, Rgb::gray(0.45));
        }
        let result = est.estimate(&frame, est.default_region(&frame));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_end_to_end_reference_frame() {
        let est = estimator();
        let mut frame = road_frame(128, 96);
        paint_columns(&mut frame, &[20, 100], 86..96);

        let result = est.estimate(&frame, ScanRegion::bottom_band(96, 10));
        assert_eq!(result.left_count, 10);
        assert_eq!(result.right_count, 10);
        assert!((result.lane_center.unwrap() - 60.0).abs() < 1e-4);
        assert!((result.error.unwrap() - (-0.0625)).abs() < 1e-6);
    }

    #[test]
    fn test_left_only_hits_give_negative_error() {
        let est = estimator();
        let mut frame = road_frame(128, 40);
        paint_columns(&mut frame, &[5, 6], 30..40);
        let result = est.estimate(&frame, est.default_region(&frame));
        // 5.5 + 0.25 * 128 = 37.5 → left of 64
        assert_eq!(result.right_count, 0);
        assert!(result.error.unwrap() < 0.0);
    }

    #[test]
    fn test_right_only_hits_give_positive_error() {
        let est = estimator();
        let mut frame = road_frame(128, 40);
        paint_columns(&mut frame, &[125], 30..40);
        let result = est.estimate(&frame, est.default_region(&frame));
        assert_eq!(result.left_count, 0);
        assert!(result.error.unwrap() > 0.0);
    }

    #[test]
    fn test_symmetric_clusters_are_centered() {
        let est = estimator();
        let width = 128;
        let mut frame = road_frame(width, 40);
        paint_columns(&mut frame, &[30, 31, 32], 30..40);
        paint_columns(&mut frame, &[95, 96, 97], 30..40);
        let result = est.estimate(&frame, est.default_region(&frame));
        let center = result.lane_center.unwrap();
        assert!((center - width as f32 / 2.0).abs() <= 1.0);
        assert!(result.error.unwrap().abs() <= 1.0 / 64.0);
    }

    #[test]
    fn test_asymmetric_weights_bias_toward_trusted_side() {
        let config = EstimatorConfig {
            left_weight: 0.75,
            right_weight: 0.25,
            ..EstimatorConfig::default()
        };
        let est = LaneEstimator::new(config);
        let mut frame = road_frame(100, 20);
        paint_columns(&mut frame, &[20, 80], 10..20);
        let result = est.estimate(&frame, est.default_region(&frame));
        // 0.75 * 20 + 0.25 * 80 = 35
        assert!((result.lane_center.unwrap() - 35.0).abs() < 1e-4);
    }

    #[test]
    fn test_markings_outside_region_are_ignored() {
        let est = estimator();
        let mut frame = road_frame(64, 48);
        paint_columns(&mut frame, &[10, 50], 0..20);
        let result = est.estimate(&frame, est.default_region(&frame));
        assert!(!result.is_detected());
    }

    #[test]
    fn test_region_larger_than_frame_is_clipped() {
        let est = estimator();
        let mut frame = road_frame(64, 8);
        paint_columns(&mut frame, &[16, 48], 0..8);
        let result = est.estimate(&frame, ScanRegion::new(4, 400));
        assert_eq!(result.left_count, 4);
        assert!(result.error.unwrap().abs() < 1e-6);
    }
}
