// src/avoidance/probe.rs
//
// Forward collision probes: three rays cast from the front of the vehicle,
// straight ahead and at ±cone angle. Used to veto a gentle recovery when the
// path back toward the lane is still blocked.

use serde::Serialize;

use crate::config::ProbeConfig;
use crate::types::{SteerSide, Vec2};

/// Ray-cast query answered by whatever owns the scene geometry.
pub trait CollisionProbe {
    /// Distance to the first hit along `direction`, or `f32::INFINITY` when
    /// nothing is hit within `max_distance`.
    fn probe(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> f32;
}

/// Probe that never hits anything.
pub struct OpenRoad;

impl CollisionProbe for OpenRoad {
    fn probe(&self, _origin: Vec2, _direction: Vec2, _max_distance: f32) -> f32 {
        f32::INFINITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProbeReading {
    pub left: f32,
    pub center: f32,
    pub right: f32,
}

impl ProbeReading {
    pub fn clear() -> Self {
        Self {
            left: f32::INFINITY,
            center: f32::INFINITY,
            right: f32::INFINITY,
        }
    }

    pub fn nearest(&self) -> f32 {
        self.left.min(self.center).min(self.right)
    }

    /// Side with more free space; ties go left.
    pub fn freer_side(&self) -> SteerSide {
        if self.right > self.left {
            SteerSide::Right
        } else {
            SteerSide::Left
        }
    }

    pub fn hits_within(&self, distance: f32) -> [bool; 3] {
        [
            self.left < distance,
            self.center < distance,
            self.right < distance,
        ]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeFan {
    origin: Vec2,
    cone_angle_deg: f32,
    max_distance: f32,
}

impl ProbeFan {
    pub fn new(origin: Vec2, cone_angle_deg: f32, max_distance: f32) -> Self {
        Self {
            origin,
            cone_angle_deg,
            max_distance,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(
            Vec2::new(0.0, config.origin_forward),
            config.cone_angle_deg,
            config.max_distance,
        )
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    pub fn scan(&self, probe: &dyn CollisionProbe) -> ProbeReading {
        let cast = |degrees: f32| {
            let dir = Vec2::FORWARD.rotated_cw(degrees);
            let d = probe.probe(self.origin, dir, self.max_distance);
            if d.is_nan() || d > self.max_distance {
                f32::INFINITY
            } else {
                d
            }
        };
        ProbeReading {
            left: cast(-self.cone_angle_deg),
            center: cast(0.0),
            right: cast(self.cone_angle_deg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wall hit only by rays leaning to one side.
    struct SideWall {
        hit_left: f32,
        hit_right: f32,
    }

    impl CollisionProbe for SideWall {
        fn probe(&self, _origin: Vec2, direction: Vec2, _max: f32) -> f32 {
            if direction.x < -1e-3 {
                self.hit_left
            } else if direction.x > 1e-3 {
                self.hit_right
            } else {
                f32::INFINITY
            }
        }
    }

    #[test]
    fn test_open_road_reads_clear() {
        let fan = ProbeFan::new(Vec2::default(), 20.0, 10.0);
        let reading = fan.scan(&OpenRoad);
        assert_eq!(reading, ProbeReading::clear());
        assert!(reading.nearest().is_infinite());
    }

    #[test]
    fn test_rays_are_split_by_side() {
        let fan = ProbeFan::new(Vec2::default(), 20.0, 10.0);
        let reading = fan.scan(&SideWall {
            hit_left: 3.0,
            hit_right: 8.0,
        });
        assert_eq!(reading.left, 3.0);
        assert_eq!(reading.right, 8.0);
        assert!(reading.center.is_infinite());
        assert_eq!(reading.freer_side(), SteerSide::Right);
    }

    #[test]
    fn test_hits_beyond_range_are_ignored() {
        let fan = ProbeFan::new(Vec2::default(), 20.0, 5.0);
        let reading = fan.scan(&SideWall {
            hit_left: 7.0,
            hit_right: 2.0,
        });
        assert!(reading.left.is_infinite());
        assert_eq!(reading.freer_side(), SteerSide::Left);
    }

    #[test]
    fn test_tie_prefers_left() {
        let reading = ProbeReading {
            left: 4.0,
            center: 1.0,
            right: 4.0,
        };
        assert_eq!(reading.freer_side(), SteerSide::Left);
        assert_eq!(reading.hits_within(2.0), [false, true, false]);
    }
}
