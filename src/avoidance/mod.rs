// src/avoidance/mod.rs

pub mod probe;
pub mod state_machine;

pub use probe::{CollisionProbe, OpenRoad, ProbeFan, ProbeReading};
pub use state_machine::{
    AvoidanceInput, AvoidanceOutput, AvoidancePhase, AvoidanceState, AvoidanceStateMachine,
    AvoidanceTransition, SpeedDirective,
};
