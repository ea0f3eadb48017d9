// src/pipeline/event_bus.rs
//
// Discrete things that happened during a run (mode switches, avoidance
// transitions, lane lost/reacquired). Consumers drain them between ticks;
// the bus keeps a bounded backlog and drops the oldest when full.

use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

use crate::arbiter::ModeSwitch;
use crate::avoidance::AvoidanceTransition;

#[derive(Debug, Clone, Serialize)]
pub enum ControlEvent {
    ModeChanged {
        tick: u64,
        switch: ModeSwitch,
    },

    Avoidance {
        tick: u64,
        transition: AvoidanceTransition,
    },

    LineLost {
        tick: u64,
    },

    LineReacquired {
        tick: u64,
        lost_ticks: u32,
    },

    SensorConflict {
        tick: u64,
    },
}

impl ControlEvent {
    pub fn tick(&self) -> u64 {
        match self {
            ControlEvent::ModeChanged { tick, .. }
            | ControlEvent::Avoidance { tick, .. }
            | ControlEvent::LineLost { tick }
            | ControlEvent::LineReacquired { tick, .. }
            | ControlEvent::SensorConflict { tick } => *tick,
        }
    }
}

pub struct EventBus {
    events: VecDeque<ControlEvent>,
    max_pending: usize,
    dropped: u64,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
            dropped: 0,
        }
    }

    pub fn publish(&mut self, event: ControlEvent) {
        if self.events.len() >= self.max_pending {
            if self.dropped == 0 {
                warn!(
                    "Event bus full ({} events), dropping oldest",
                    self.max_pending
                );
            }
            self.dropped += 1;
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<ControlEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
