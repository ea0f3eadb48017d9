// src/interface.rs
//
// Boundary traits. The control core never talks to a camera, a keyboard or
// a drivetrain directly; whoever hosts it implements these.

use crate::types::{Command, Frame, ManualInput};

/// Camera. `None` means no frame this tick (capture failed or not ready).
pub trait FrameSource {
    fn capture(&mut self) -> Option<Frame>;
}

/// Driver controls, polled once per tick.
pub trait ManualInputSource {
    fn poll(&mut self) -> ManualInput;
}

/// Drivetrain and steering actuators.
pub trait ActuationSink {
    fn apply(&mut self, command: Command);
}

/// Manual input that never touches the controls.
pub struct NoDriver;

impl ManualInputSource for NoDriver {
    fn poll(&mut self) -> ManualInput {
        ManualInput::idle()
    }
}

/// Replays a fixed list of inputs, one per tick, then goes idle.
pub struct ScriptedInput {
    script: std::collections::VecDeque<ManualInput>,
}

impl ScriptedInput {
    pub fn new(script: impl IntoIterator<Item = ManualInput>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl ManualInputSource for ScriptedInput {
    fn poll(&mut self) -> ManualInput {
        self.script.pop_front().unwrap_or_default()
    }
}

/// Sink that records every applied command.
#[derive(Default)]
pub struct CommandLog {
    pub commands: Vec<Command>,
}

impl ActuationSink for CommandLog {
    fn apply(&mut self, command: Command) {
        self.commands.push(command);
    }
}
