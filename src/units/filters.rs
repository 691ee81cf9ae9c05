use std::fmt;
use std::ops::{Neg, Not};
use std::sync::Arc;

use super::Unit;
use crate::error::PatchError;
use crate::events::{Event, EventTypes};

/// The match condition of a [`Filter`], evaluated only on events of the
/// filter's own types.
#[derive(Clone)]
pub enum Condition {
    Types(EventTypes),
    Ports(Vec<u16>),
    Channels(Vec<u8>),
    Keys(Vec<i32>),
    KeyRange(i32, i32),
    VelocityRange(i32, i32),
    Ctrls(Vec<i32>),
    CtrlValueRange(i32, i32),
    Programs(Vec<i32>),
    SysEx { pattern: Arc<[u8]>, partial: bool },
    Predicate(Arc<dyn Fn(&Event) -> bool + Send + Sync>),
}

impl Condition {
    fn holds(&self, event: &Event) -> bool {
        match self {
            Condition::Types(types) => event.is(*types),
            Condition::Ports(ports) => ports.contains(&event.port()),
            Condition::Channels(channels) => {
                event.channel().is_ok_and(|ch| channels.contains(&ch))
            }
            Condition::Keys(keys) => event.note().is_ok_and(|n| keys.contains(&n)),
            Condition::KeyRange(lo, hi) => event.note().is_ok_and(|n| (*lo..*hi).contains(&n)),
            Condition::VelocityRange(lo, hi) => {
                event.velocity().is_ok_and(|v| (*lo..*hi).contains(&v))
            }
            Condition::Ctrls(ctrls) => event.ctrl().is_ok_and(|c| ctrls.contains(&c)),
            Condition::CtrlValueRange(lo, hi) => {
                event.value().is_ok_and(|v| (*lo..*hi).contains(&v))
            }
            Condition::Programs(programs) => event.program().is_ok_and(|p| programs.contains(&p)),
            Condition::SysEx { pattern, partial } => event.sysex_data().is_ok_and(|data| {
                if *partial {
                    data.starts_with(pattern)
                } else {
                    data == &pattern[..]
                }
            }),
            Condition::Predicate(f) => f(event),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Types(types) => write!(f, "Types({types:?})"),
            Condition::Ports(ports) => write!(f, "Ports({ports:?})"),
            Condition::Channels(channels) => write!(f, "Channels({channels:?})"),
            Condition::Keys(keys) => write!(f, "Keys({keys:?})"),
            Condition::KeyRange(lo, hi) => write!(f, "KeyRange({lo}..{hi})"),
            Condition::VelocityRange(lo, hi) => write!(f, "VelocityRange({lo}..{hi})"),
            Condition::Ctrls(ctrls) => write!(f, "Ctrls({ctrls:?})"),
            Condition::CtrlValueRange(lo, hi) => write!(f, "CtrlValueRange({lo}..{hi})"),
            Condition::Programs(programs) => write!(f, "Programs({programs:?})"),
            Condition::SysEx { pattern, partial } => {
                write!(f, "SysEx({:02x?}, partial: {partial})", &pattern[..])
            }
            Condition::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Stateless predicate over events, usable both as a unit and as the leaf of
/// a [`Selector`](crate::patch::Selector).
///
/// A filter only judges events of its own `types`. Everything else gets the
/// fixed `pass_other` verdict: note filters let other events through, the
/// rest drop them.
///
/// [`Filter::invert`] flips the condition on the filter's own types and leaves
/// the verdict for other types alone, so `!ctrl_filter([7])` passes every
/// controller except 7 and still drops notes. [`Filter::negate`] is the plain
/// complement over every event type, so `-ctrl_filter([7])` passes notes too.
/// The two are easy to mix up; pick deliberately.
#[derive(Debug, Clone)]
pub struct Filter {
    types: EventTypes,
    pass_other: bool,
    condition: Condition,
    inverted: bool,
    negated: bool,
}

impl Filter {
    pub fn new(types: EventTypes, pass_other: bool, condition: Condition) -> Self {
        Self {
            types,
            pass_other,
            condition,
            inverted: false,
            negated: false,
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        let verdict = if event.is(self.types) {
            self.condition.holds(event) != self.inverted
        } else {
            self.pass_other
        };
        verdict != self.negated
    }

    pub fn invert(mut self) -> Self {
        // a negated filter already covers every type, so inverting it is a
        // plain complement
        if self.negated {
            self.negated = false;
        } else {
            self.inverted = !self.inverted;
        }
        self
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

impl Unit for Filter {
    fn process(&self, event: Event) -> Vec<Event> {
        if self.matches(&event) {
            vec![event]
        } else {
            Vec::new()
        }
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        self.invert()
    }
}

impl Neg for Filter {
    type Output = Filter;

    fn neg(self) -> Filter {
        self.negate()
    }
}

fn check_range(what: &'static str, lo: i32, hi: i32, max: i32) -> Result<(), PatchError> {
    if lo < 0 || hi > max || lo >= hi {
        return Err(PatchError::InvalidRange { what, lo, hi });
    }
    Ok(())
}

fn non_empty<T>(what: &'static str, values: Vec<T>) -> Result<Vec<T>, PatchError> {
    if values.is_empty() {
        return Err(PatchError::EmptyList(what));
    }
    Ok(values)
}

fn data_values(
    what: &'static str,
    values: impl IntoIterator<Item = i32>,
) -> Result<Vec<i32>, PatchError> {
    let values = non_empty(what, values.into_iter().collect())?;
    if let Some(&value) = values.iter().find(|v| !(0..128).contains(*v)) {
        return Err(PatchError::OutOfRange { what, value });
    }
    Ok(values)
}

pub fn type_filter(types: EventTypes) -> Filter {
    Filter::new(EventTypes::ANY, false, Condition::Types(types))
}

pub fn port_filter(ports: impl IntoIterator<Item = u16>) -> Result<Filter, PatchError> {
    let ports = non_empty("port filter", ports.into_iter().collect())?;
    Ok(Filter::new(EventTypes::ANY, false, Condition::Ports(ports)))
}

pub fn channel_filter(channels: impl IntoIterator<Item = u8>) -> Result<Filter, PatchError> {
    let channels = non_empty("channel filter", channels.into_iter().collect())?;
    if let Some(&ch) = channels.iter().find(|ch| **ch > 15) {
        return Err(PatchError::OutOfRange {
            what: "channel",
            value: i32::from(ch),
        });
    }
    Ok(Filter::new(
        EventTypes::CHANNEL,
        false,
        Condition::Channels(channels),
    ))
}

/// Notes in `[lo, hi)`. Events other than notes pass.
pub fn key_filter(lo: i32, hi: i32) -> Result<Filter, PatchError> {
    check_range("key filter", lo, hi, 128)?;
    Ok(Filter::new(EventTypes::NOTE, true, Condition::KeyRange(lo, hi)))
}

pub fn key_list_filter(notes: impl IntoIterator<Item = i32>) -> Result<Filter, PatchError> {
    let notes = data_values("key filter", notes)?;
    Ok(Filter::new(EventTypes::NOTE, true, Condition::Keys(notes)))
}

/// Note-ons with velocity in `[lo, hi)`. Note-offs and other events pass.
pub fn velocity_filter(lo: i32, hi: i32) -> Result<Filter, PatchError> {
    check_range("velocity filter", lo, hi, 128)?;
    Ok(Filter::new(
        EventTypes::NOTEON,
        true,
        Condition::VelocityRange(lo, hi),
    ))
}

pub fn ctrl_filter(ctrls: impl IntoIterator<Item = i32>) -> Result<Filter, PatchError> {
    let ctrls = data_values("ctrl filter", ctrls)?;
    Ok(Filter::new(EventTypes::CTRL, false, Condition::Ctrls(ctrls)))
}

/// Controllers with value in `[lo, hi)`.
pub fn ctrl_value_filter(lo: i32, hi: i32) -> Result<Filter, PatchError> {
    check_range("ctrl value filter", lo, hi, 128)?;
    Ok(Filter::new(
        EventTypes::CTRL,
        false,
        Condition::CtrlValueRange(lo, hi),
    ))
}

pub fn program_filter(programs: impl IntoIterator<Item = i32>) -> Result<Filter, PatchError> {
    let programs = data_values("program filter", programs)?;
    Ok(Filter::new(
        EventTypes::PROGRAM,
        false,
        Condition::Programs(programs),
    ))
}

/// Matches sysex payloads equal to `pattern`, or starting with it when
/// `partial` is set.
pub fn sysex_filter(pattern: impl Into<Vec<u8>>, partial: bool) -> Result<Filter, PatchError> {
    let pattern = pattern.into();
    Event::sysex(0, pattern.clone())?;
    Ok(Filter::new(
        EventTypes::SYSEX,
        false,
        Condition::SysEx {
            pattern: pattern.into(),
            partial,
        },
    ))
}

/// Escape-hatch filter: `f` decides for events of `types`, everything else is
/// dropped.
pub fn predicate_filter<F>(types: EventTypes, f: F) -> Filter
where
    F: Fn(&Event) -> bool + Send + Sync + 'static,
{
    Filter::new(types, false, Condition::Predicate(Arc::new(f)))
}
