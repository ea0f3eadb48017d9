// src/types.rs
//
// Plain data carried through one control tick: the captured frame, the lane
// estimate derived from it, the obstacle reading, manual axes and the final
// actuation command.

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

// ============================================================================
// FRAME
// ============================================================================

/// One RGB pixel, channels in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(v: f32) -> Self {
        Self::new(v, v, v)
    }

    /// Mean of the three channels.
    #[inline]
    pub fn intensity(&self) -> f32 {
        (self.r + self.g + self.b) / 3.0
    }

    /// Max channel minus min channel.
    #[inline]
    pub fn saturation(&self) -> f32 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        max - min
    }
}

/// A single captured camera image. Row 0 is the top of the image, so the
/// rows nearest the vehicle are at the bottom.
#[derive(Debug, Clone)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
    /// Tick in which the frame was captured
    pub captured_tick: u64,
}

impl Frame {
    pub fn new(width: usize, height: usize, pixels: Vec<Rgb>) -> Result<Self, ControlError> {
        if width == 0 || height == 0 || pixels.len() != width * height {
            return Err(ControlError::FrameShape {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            captured_tick: 0,
        })
    }

    /// Frame filled with a single color.
    pub fn filled(width: usize, height: usize, color: Rgb) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            pixels: vec![color; width.max(1) * height.max(1)],
            captured_tick: 0,
        }
    }

    /// Build from packed 8-bit RGB triplets.
    pub fn from_rgb8(width: usize, height: usize, data: &[u8]) -> Result<Self, ControlError> {
        if data.len() != width * height * 3 {
            return Err(ControlError::FrameShape {
                width,
                height,
                len: data.len() / 3,
            });
        }
        let pixels = data
            .chunks_exact(3)
            .map(|c| {
                Rgb::new(
                    c[0] as f32 / 255.0,
                    c[1] as f32 / 255.0,
                    c[2] as f32 / 255.0,
                )
            })
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn with_tick(mut self, tick: u64) -> Self {
        self.captured_tick = tick;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        self.pixels[y * self.width + x]
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: Rgb) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }

    pub fn row(&self, y: usize) -> &[Rgb] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }
}

// ============================================================================
// PERCEPTION
// ============================================================================

/// Result of scanning one frame for lane markings.
///
/// `error` is `None` when no qualifying pixel was found on either side; that
/// is a normal outcome and callers hold their previous command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LaneEstimate {
    /// Normalized lateral error, roughly [-1, 1]
    pub error: Option<f32>,
    /// Estimated lane center column
    pub lane_center: Option<f32>,
    pub left_count: usize,
    pub right_count: usize,
}

impl LaneEstimate {
    pub fn no_detection() -> Self {
        Self::default()
    }

    pub fn is_detected(&self) -> bool {
        self.error.is_some()
    }
}

// ============================================================================
// OBSTACLES
// ============================================================================

/// Level-triggered obstacle reading for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObstacleSignal {
    pub detected: bool,
    /// Normalized steering suggested to clear the obstacle, positive = right
    pub suggested_correction: f32,
}

impl ObstacleSignal {
    pub fn clear() -> Self {
        Self::default()
    }

    pub fn detected(suggested_correction: f32) -> Self {
        Self {
            detected: true,
            suggested_correction,
        }
    }
}

/// Side of the vehicle to steer toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SteerSide {
    Left,
    Right,
}

impl SteerSide {
    pub fn sign(&self) -> f32 {
        match self {
            SteerSide::Left => -1.0,
            SteerSide::Right => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SteerSide::Left => "LEFT",
            SteerSide::Right => "RIGHT",
        }
    }
}

/// 2-D vector in the vehicle frame: +x right, +y forward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const FORWARD: Vec2 = Vec2 { x: 0.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Rotate clockwise (toward +x) by `degrees`.
    pub fn rotated_cw(&self, degrees: f32) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self::new(self.x * c + self.y * s, -self.x * s + self.y * c)
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn scale(&self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k)
    }

    pub fn add(&self, other: Vec2) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(&self, other: Vec2) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

// ============================================================================
// COMMANDS AND MODES
// ============================================================================

/// Final actuation command for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Command {
    /// Wheel angle in degrees, positive = right
    pub steering_angle: f32,
    /// Normalized drive effort [0, 1]
    pub propulsion: f32,
    /// Normalized brake effort [0, 1]
    pub brake: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Autonomous,
    Manual,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Autonomous => "AUTONOMOUS",
            Mode::Manual => "MANUAL",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Mode::Autonomous => Mode::Manual,
            Mode::Manual => Mode::Autonomous,
        }
    }
}

/// Raw manual axes for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ManualInput {
    /// [-1, 1], positive = right
    pub steer: f32,
    /// [0, 1]
    pub throttle: f32,
    /// [0, 1]
    pub brake: f32,
    /// Discrete mode-toggle event (key press or wheel button)
    pub toggle_mode: bool,
}

impl ManualInput {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn toggle() -> Self {
        Self {
            toggle_mode: true,
            ..Self::default()
        }
    }

    /// Inputs clamped into their documented ranges.
    pub fn sanitized(&self) -> Self {
        Self {
            steer: self.steer.clamp(-1.0, 1.0),
            throttle: self.throttle.clamp(0.0, 1.0),
            brake: self.brake.clamp(0.0, 1.0),
            toggle_mode: self.toggle_mode,
        }
    }
}
