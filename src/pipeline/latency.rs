// src/pipeline/latency.rs
//
// One-tick frame latency. The frame captured in tick N is handed to the
// estimator in tick N+1, so the first tick after start always sees nothing.

use crate::types::Frame;

#[derive(Debug, Default)]
pub struct FrameStage {
    held: Option<Frame>,
}

impl FrameStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store this tick's capture and release the previous tick's.
    pub fn advance(&mut self, captured: Option<Frame>) -> Option<Frame> {
        std::mem::replace(&mut self.held, captured)
    }

    pub fn is_primed(&self) -> bool {
        self.held.is_some()
    }

    pub fn clear(&mut self) {
        self.held = None;
    }
}
