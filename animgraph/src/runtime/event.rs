use crate::{MotionEvent, NodeIndex, Transform};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventState {
    Start,
    Active,
    End,
}

/// One event fired during a tick, tagged with the node that emitted it.
#[derive(Clone, Debug, PartialEq)]
pub struct EventInfo {
    pub time_value: f32,
    pub event: MotionEvent,
    pub emitter: Option<NodeIndex>,
    pub global_weight: f32,
    pub local_weight: f32,
    pub state: EventState,
}

impl EventInfo {
    pub fn new(time_value: f32, event: MotionEvent, state: EventState) -> Self {
        Self {
            time_value,
            event,
            emitter: None,
            global_weight: 1.0,
            local_weight: 1.0,
            state,
        }
    }

    pub fn is_tick_event(&self) -> bool {
        self.event.is_tick_event()
    }
}

/// Per-tick event buffer and motion-extraction delta of one node. Pooled and reference counted
/// like output poses.
#[derive(Clone, Debug, Default)]
pub struct RefCountedData {
    pub events: Vec<EventInfo>,
    pub trajectory_delta: Transform,
}

impl RefCountedData {
    pub fn clear(&mut self) {
        self.events.clear();
        self.trajectory_delta = Transform::IDENTITY;
    }

    pub fn copy_from(&mut self, other: &RefCountedData) {
        self.events.clone_from(&other.events);
        self.trajectory_delta = other.trajectory_delta;
    }
}
