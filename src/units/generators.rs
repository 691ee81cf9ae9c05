use tracing::warn;

use super::Unit;
use crate::error::{EventError, PatchError};
use crate::events::Event;
use crate::patch::Node;

/// A generator parameter: a constant, or a field copied from the incoming
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Fixed(i32),
    Note,
    Velocity,
    Ctrl,
    Value,
    Program,
}

impl Param {
    fn resolve(self, event: &Event) -> Result<i32, EventError> {
        match self {
            Param::Fixed(value) => Ok(value),
            Param::Note => event.note(),
            Param::Velocity => event.velocity(),
            Param::Ctrl => event.ctrl(),
            Param::Value => event.value(),
            Param::Program => event.program(),
        }
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Fixed(value)
    }
}

/// Replaces the incoming event with a new one of a fixed type, keeping its
/// port, channel and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generator {
    NoteOn { note: Param, velocity: Param },
    NoteOff { note: Param, velocity: Param },
    Ctrl { ctrl: Param, value: Param },
    Program(Param),
    Pitchbend(Param),
    Aftertouch(Param),
    PolyAftertouch { note: Param, value: Param },
    SysEx(Vec<u8>),
}

impl Generator {
    fn generate(&self, source: &Event) -> Result<Event, EventError> {
        let port = source.port();
        let ch = source.channel().unwrap_or(0);
        let event = match self {
            Generator::NoteOn { note, velocity } => {
                Event::note_on(port, ch, note.resolve(source)?, velocity.resolve(source)?)
            }
            Generator::NoteOff { note, velocity } => {
                Event::note_off(port, ch, note.resolve(source)?, velocity.resolve(source)?)
            }
            Generator::Ctrl { ctrl, value } => {
                Event::control_change(port, ch, ctrl.resolve(source)?, value.resolve(source)?)
            }
            Generator::Program(program) => Event::program_change(port, ch, program.resolve(source)?),
            Generator::Pitchbend(value) => Event::pitchbend(port, ch, value.resolve(source)?),
            Generator::Aftertouch(value) => Event::aftertouch(port, ch, value.resolve(source)?),
            Generator::PolyAftertouch { note, value } => {
                Event::poly_aftertouch(port, ch, note.resolve(source)?, value.resolve(source)?)
            }
            Generator::SysEx(data) => Event::sysex(port, data.clone())?,
        };
        Ok(event.at(source.time()))
    }
}

impl Unit for Generator {
    fn process(&self, event: Event) -> Vec<Event> {
        match self.generate(&event) {
            Ok(generated) => vec![generated],
            Err(err) => {
                warn!(generator = ?self, %event, "cannot generate event: {}", err);
                Vec::new()
            }
        }
    }
}

pub fn note_on(note: impl Into<Param>, velocity: impl Into<Param>) -> Node {
    Node::unit(Generator::NoteOn {
        note: note.into(),
        velocity: velocity.into(),
    })
}

pub fn note_off(note: impl Into<Param>, velocity: impl Into<Param>) -> Node {
    Node::unit(Generator::NoteOff {
        note: note.into(),
        velocity: velocity.into(),
    })
}

pub fn ctrl(ctrl: impl Into<Param>, value: impl Into<Param>) -> Node {
    Node::unit(Generator::Ctrl {
        ctrl: ctrl.into(),
        value: value.into(),
    })
}

pub fn program(program: impl Into<Param>) -> Node {
    Node::unit(Generator::Program(program.into()))
}

pub fn pitchbend(value: impl Into<Param>) -> Node {
    Node::unit(Generator::Pitchbend(value.into()))
}

pub fn aftertouch(value: impl Into<Param>) -> Node {
    Node::unit(Generator::Aftertouch(value.into()))
}

pub fn poly_aftertouch(note: impl Into<Param>, value: impl Into<Param>) -> Node {
    Node::unit(Generator::PolyAftertouch {
        note: note.into(),
        value: value.into(),
    })
}

pub fn sysex(data: impl Into<Vec<u8>>) -> Result<Node, PatchError> {
    let data = data.into();
    Event::sysex(0, data.clone())?;
    Ok(Node::unit(Generator::SysEx(data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn takes_port_channel_and_time_from_source() {
        let source = Event::note_on(2, 9, 60, 100).at(Duration::from_millis(5));
        let generator = Generator::Ctrl {
            ctrl: Param::Fixed(1),
            value: Param::Velocity,
        };
        assert_eq!(
            generator.process(source),
            vec![Event::control_change(2, 9, 1, 100).at(Duration::from_millis(5))]
        );
    }

    #[test]
    fn channelless_sources_default_to_channel_zero() {
        let generator = Generator::Program(Param::Fixed(4));
        assert_eq!(
            generator.process(Event::dummy()),
            vec![Event::program_change(0, 0, 4)]
        );
    }

    #[test]
    fn unresolvable_params_discard() {
        let generator = Generator::NoteOn {
            note: Param::Note,
            velocity: Param::Fixed(100),
        };
        assert!(generator.process(Event::program_change(0, 0, 1)).is_empty());
    }

    #[test]
    fn sysex_generator_validates_payload() {
        assert!(sysex(vec![0x01]).is_err());
        let generator = Generator::SysEx(vec![0xf0, 0x01, 0xf7]);
        let out = generator.process(Event::note_on(3, 0, 60, 1));
        assert_eq!(out[0].port(), 3);
        assert_eq!(out[0].sysex_data(), Ok(&[0xf0, 0x01, 0xf7][..]));
    }
}
