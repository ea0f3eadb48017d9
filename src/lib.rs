// src/lib.rs
//
// Camera-based lane keeping with obstacle avoidance and a manual override.

pub mod arbiter;
pub mod avoidance;
pub mod config;
pub mod error;
pub mod frame_source;
pub mod interface;
pub mod lane_detection;
pub mod obstacle;
pub mod pid;
pub mod pipeline;
pub mod sim;
pub mod smoother;
pub mod types;

pub use arbiter::{CommandArbiter, ModeSwitch, SwitchReason};
pub use config::Config;
pub use error::{ControlError, Degradation};
pub use lane_detection::{LaneEstimator, ScanRegion};
pub use pid::PidController;
pub use pipeline::{ControlLoop, TickContext, VehicleController};
pub use types::{Command, Frame, LaneEstimate, ManualInput, Mode, ObstacleSignal};
