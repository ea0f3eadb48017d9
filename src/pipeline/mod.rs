// src/pipeline/mod.rs

pub mod control_loop;
pub mod controller;
pub mod event_bus;
pub mod latency;
pub mod metrics;
pub mod tick_context;

pub use control_loop::{ControlLoop, ControlLoopBuilder};
pub use controller::VehicleController;
pub use event_bus::{ControlEvent, EventBus};
pub use latency::FrameStage;
pub use metrics::{ControlMetrics, MetricsSummary};
pub use tick_context::TickContext;
