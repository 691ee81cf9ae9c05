mod call;
mod filters;
mod generators;
mod modifiers;

use std::fmt;

use crate::events::Event;
use crate::patch::Node;

pub use call::{call, call_thread, print, process, Call, Print, Process};
pub use filters::{
    channel_filter, ctrl_filter, ctrl_value_filter, key_filter, key_list_filter, port_filter,
    predicate_filter, program_filter, sysex_filter, type_filter, velocity_filter, Condition,
    Filter,
};
pub use generators::{
    aftertouch, ctrl, note_off, note_on, pitchbend, poly_aftertouch, program, sysex, Generator,
    Param,
};
pub use modifiers::{
    channel, ctrl_curve, ctrl_map, ctrl_range, key, pitchbend_range, port, sanitize, transpose,
    velocity, Curve, Modifier,
};

/// Atomic operation over one event.
///
/// An empty result discards the event. Units are shared across the compiled
/// tree, so any state they keep must sit behind interior mutability.
pub trait Unit: Send + Sync + fmt::Debug {
    fn process(&self, event: Event) -> Vec<Event>;
}

/// Return values accepted from escape-hatch callables.
pub trait IntoEvents {
    fn into_events(self) -> Vec<Event>;
}

impl IntoEvents for () {
    fn into_events(self) -> Vec<Event> {
        Vec::new()
    }
}

impl IntoEvents for Event {
    fn into_events(self) -> Vec<Event> {
        vec![self]
    }
}

impl IntoEvents for Option<Event> {
    fn into_events(self) -> Vec<Event> {
        self.into_iter().collect()
    }
}

impl IntoEvents for Vec<Event> {
    fn into_events(self) -> Vec<Event> {
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pass;

impl Unit for Pass {
    fn process(&self, event: Event) -> Vec<Event> {
        vec![event]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl Unit for Discard {
    fn process(&self, _event: Event) -> Vec<Event> {
        Vec::new()
    }
}

pub fn pass() -> Node {
    Node::unit(Pass)
}

pub fn discard() -> Node {
    Node::unit(Discard)
}
