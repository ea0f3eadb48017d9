// src/sim.rs
//
// Toy track world for closed-loop runs without hardware.
//
// A kinematic bicycle drives along a road whose center line is a sine wave
// (amplitude 0 gives a straight road). The camera renders a top-down band
// of the road ahead with two white lane lines on dark asphalt; obstacles
// are circles on the road, seen through a trigger zone and ray casts.
//
// World axes: x lateral (+right), s along the road. Heading is measured
// from the road direction, positive toward +x.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::avoidance::CollisionProbe;
use crate::config::ObstacleConfig;
use crate::interface::{ActuationSink, FrameSource};
use crate::obstacle::{ObstacleMonitor, TriggerZone};
use crate::types::{Command, Frame, ObstacleSignal, Rgb, Vec2};

const ASPHALT: Rgb = Rgb::new(0.18, 0.18, 0.2);
const LINE: Rgb = Rgb::new(0.95, 0.95, 0.92);

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimObstacle {
    /// Distance along the road (m)
    pub s: f32,
    /// Lateral offset from the lane center (m)
    pub x: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub lane_half_width: f32,
    pub curve_amplitude: f32,
    pub curve_wavelength: f32,
    pub start_offset: f32,
    pub wheelbase: f32,
    /// Speed at full propulsion (m/s)
    pub top_speed: f32,
    pub camera_width: usize,
    pub camera_height: usize,
    pub pixels_per_meter: f32,
    /// Distance from the vehicle to the bottom camera row (m)
    pub camera_near: f32,
    pub row_spacing: f32,
    pub zone_length: f32,
    pub zone_half_width: f32,
    /// Drop every Nth capture, if set
    pub frame_drop_every: Option<u64>,
    pub obstacles: Vec<SimObstacle>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            lane_half_width: 1.5,
            curve_amplitude: 2.0,
            curve_wavelength: 150.0,
            start_offset: 0.3,
            wheelbase: 2.5,
            top_speed: 10.0,
            camera_width: 128,
            camera_height: 48,
            pixels_per_meter: 20.0,
            camera_near: 3.0,
            row_spacing: 0.2,
            zone_length: 6.0,
            zone_half_width: 0.6,
            frame_drop_every: None,
            obstacles: vec![
                SimObstacle {
                    s: 80.0,
                    x: 0.4,
                    radius: 0.4,
                },
                SimObstacle {
                    s: 200.0,
                    x: -0.5,
                    radius: 0.4,
                },
            ],
        }
    }
}

// ============================================================================
// WORLD
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VehiclePose {
    pub x: f32,
    pub s: f32,
    pub heading: f32,
    pub speed: f32,
}

pub struct TrackWorld {
    config: SimConfig,
    pose: VehiclePose,
    zone: TriggerZone,
    captures: u64,
    /// Closest approach to any obstacle surface (m, negative = contact)
    min_clearance: f32,
}

impl TrackWorld {
    pub fn new(config: SimConfig, obstacle: &ObstacleConfig) -> Self {
        let pose = VehiclePose {
            x: config.start_offset,
            ..VehiclePose::default()
        };
        Self {
            config,
            pose,
            zone: TriggerZone::new(obstacle),
            captures: 0,
            min_clearance: f32::INFINITY,
        }
    }

    pub fn lane_center(&self, s: f32) -> f32 {
        let c = &self.config;
        if c.curve_amplitude == 0.0 || c.curve_wavelength <= 0.0 {
            return 0.0;
        }
        c.curve_amplitude * (std::f32::consts::TAU * s / c.curve_wavelength).sin()
    }

    pub fn pose(&self) -> VehiclePose {
        self.pose
    }

    /// Lateral distance from the lane center, positive = right of center.
    pub fn lateral_offset(&self) -> f32 {
        self.pose.x - self.lane_center(self.pose.s)
    }

    pub fn min_clearance(&self) -> f32 {
        self.min_clearance
    }

    fn vehicle_to_world(&self, v: Vec2) -> Vec2 {
        let (sin, cos) = self.pose.heading.sin_cos();
        Vec2::new(v.x * cos + v.y * sin, -v.x * sin + v.y * cos)
    }

    fn world_to_vehicle(&self, w: Vec2) -> Vec2 {
        let (sin, cos) = self.pose.heading.sin_cos();
        Vec2::new(w.x * cos - w.y * sin, w.x * sin + w.y * cos)
    }

    fn obstacle_world(o: &SimObstacle, center: f32) -> Vec2 {
        Vec2::new(center + o.x, o.s)
    }

    pub fn render(&self) -> Frame {
        let c = &self.config;
        let mut frame = Frame::filled(c.camera_width, c.camera_height, ASPHALT);
        let half = c.camera_width as f32 / 2.0;
        let (sin, cos) = self.pose.heading.sin_cos();

        for y in 0..c.camera_height {
            let d = c.camera_near + (c.camera_height - 1 - y) as f32 * c.row_spacing;
            let ahead_x = self.pose.x + d * sin;
            let ahead_s = self.pose.s + d * cos;
            let center = self.lane_center(ahead_s);
            for line in [center - c.lane_half_width, center + c.lane_half_width] {
                let col = half + (line - ahead_x) * cos * c.pixels_per_meter;
                if col < 0.0 {
                    continue;
                }
                let col = col.round() as usize;
                frame.set_pixel(col, y, LINE);
                frame.set_pixel(col + 1, y, LINE);
            }
        }
        frame
    }

    /// Feed every obstacle inside the zone to the trigger, nearest last.
    fn update_zone(&mut self) {
        let origin = Vec2::new(self.pose.x, self.pose.s);
        let mut inside: Vec<Vec2> = self
            .config
            .obstacles
            .iter()
            .map(|o| {
                let world = Self::obstacle_world(o, self.lane_center(o.s));
                (self.world_to_vehicle(world.sub(origin)), o.radius)
            })
            .filter(|(rel, r)| {
                rel.y > 0.0
                    && rel.y < self.config.zone_length
                    && rel.x.abs() < self.config.zone_half_width + r
            })
            .map(|(rel, _)| rel)
            .collect();

        if inside.is_empty() {
            self.zone.on_exit();
            return;
        }
        inside.sort_by(|a, b| b.y.total_cmp(&a.y));
        for rel in inside {
            self.zone.on_stay(rel);
        }
    }

    fn cast(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> f32 {
        let o = Vec2::new(self.pose.x, self.pose.s).add(self.vehicle_to_world(origin));
        let len = direction.length();
        if len == 0.0 {
            return f32::INFINITY;
        }
        let d = self.vehicle_to_world(direction.scale(1.0 / len));

        let mut nearest = f32::INFINITY;
        for obstacle in &self.config.obstacles {
            let center = Self::obstacle_world(obstacle, self.lane_center(obstacle.s));
            let f = o.sub(center);
            let b = f.dot(d);
            let c = f.dot(f) - obstacle.radius * obstacle.radius;
            let disc = b * b - c;
            if disc < 0.0 {
                continue;
            }
            let root = disc.sqrt();
            let t = if -b - root >= 0.0 { -b - root } else { -b + root };
            if t >= 0.0 && t <= max_distance {
                nearest = nearest.min(t);
            }
        }
        nearest
    }

    pub fn advance(&mut self, command: Command, dt: f32) {
        let c = &self.config;
        let p = &mut self.pose;
        p.speed = (command.propulsion * c.top_speed * (1.0 - command.brake)).max(0.0);
        let steer = command.steering_angle.to_radians();
        p.heading += p.speed * steer.tan() / c.wheelbase * dt;
        p.x += p.speed * p.heading.sin() * dt;
        p.s += p.speed * p.heading.cos() * dt;

        let here = Vec2::new(self.pose.x, self.pose.s);
        for obstacle in &self.config.obstacles {
            let center = Self::obstacle_world(obstacle, self.lane_center(obstacle.s));
            let clearance = here.sub(center).length() - obstacle.radius;
            if clearance < self.min_clearance {
                self.min_clearance = clearance;
            }
        }
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Shared handle to a `TrackWorld`. Clone one per boundary role (camera,
/// obstacle monitor, drivetrain) and keep one for inspection.
#[derive(Clone)]
pub struct SimHandle {
    world: Rc<RefCell<TrackWorld>>,
    dt: f32,
}

impl SimHandle {
    pub fn new(world: TrackWorld, dt: f32) -> Self {
        info!(
            "🏁 Sim track: amplitude {:.1}m, {} obstacles",
            world.config.curve_amplitude,
            world.config.obstacles.len()
        );
        Self {
            world: Rc::new(RefCell::new(world)),
            dt,
        }
    }

    pub fn pose(&self) -> VehiclePose {
        self.world.borrow().pose()
    }

    pub fn lateral_offset(&self) -> f32 {
        self.world.borrow().lateral_offset()
    }

    pub fn min_clearance(&self) -> f32 {
        self.world.borrow().min_clearance()
    }
}

impl FrameSource for SimHandle {
    fn capture(&mut self) -> Option<Frame> {
        let mut world = self.world.borrow_mut();
        world.captures += 1;
        if let Some(n) = world.config.frame_drop_every {
            if n > 0 && world.captures % n == 0 {
                debug!("📷 Dropped capture {}", world.captures);
                return None;
            }
        }
        Some(world.render())
    }
}

impl CollisionProbe for SimHandle {
    fn probe(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> f32 {
        self.world.borrow().cast(origin, direction, max_distance)
    }
}

impl ObstacleMonitor for SimHandle {
    fn signal(&mut self) -> ObstacleSignal {
        let mut world = self.world.borrow_mut();
        world.update_zone();
        world.zone.signal()
    }

    fn sensor_conflict(&self) -> bool {
        self.world.borrow().zone.is_conflicted()
    }
}

impl ActuationSink for SimHandle {
    fn apply(&mut self, command: Command) {
        self.world.borrow_mut().advance(command, self.dt);
    }
}
