use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::notes::note_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    NoteOn,
    NoteOff,
    Ctrl,
    Pitchbend,
    Aftertouch,
    PolyAftertouch,
    Program,
    SysEx,
    SysCmQFrame,
    SysCmSongPos,
    SysCmSongSel,
    SysCmTuneReq,
    SysRtClock,
    SysRtStart,
    SysRtContinue,
    SysRtStop,
    SysRtSensing,
    SysRtReset,
    /// Carrier event init and exit trees are run on.
    Dummy,
    /// In-band request to switch scenes, consumed by the engine.
    SceneSwitch,
    /// In-band request to switch subscenes, consumed by the engine.
    SubSceneSwitch,
}

const ALL_TYPES: [EventType; 21] = [
    EventType::NoteOn,
    EventType::NoteOff,
    EventType::Ctrl,
    EventType::Pitchbend,
    EventType::Aftertouch,
    EventType::PolyAftertouch,
    EventType::Program,
    EventType::SysEx,
    EventType::SysCmQFrame,
    EventType::SysCmSongPos,
    EventType::SysCmSongSel,
    EventType::SysCmTuneReq,
    EventType::SysRtClock,
    EventType::SysRtStart,
    EventType::SysRtContinue,
    EventType::SysRtStop,
    EventType::SysRtSensing,
    EventType::SysRtReset,
    EventType::Dummy,
    EventType::SceneSwitch,
    EventType::SubSceneSwitch,
];

impl EventType {
    pub const fn mask(self) -> EventTypes {
        EventTypes(1 << self as u32)
    }

    pub const fn has_channel(self) -> bool {
        EventTypes::CHANNEL.contains(self)
    }

    pub const fn name(self) -> &'static str {
        match self {
            EventType::NoteOn => "note_on",
            EventType::NoteOff => "note_off",
            EventType::Ctrl => "ctrl",
            EventType::Pitchbend => "pitchbend",
            EventType::Aftertouch => "aftertouch",
            EventType::PolyAftertouch => "poly_aftertouch",
            EventType::Program => "program",
            EventType::SysEx => "sysex",
            EventType::SysCmQFrame => "qframe",
            EventType::SysCmSongPos => "songpos",
            EventType::SysCmSongSel => "songsel",
            EventType::SysCmTuneReq => "tunereq",
            EventType::SysRtClock => "clock",
            EventType::SysRtStart => "start",
            EventType::SysRtContinue => "continue",
            EventType::SysRtStop => "stop",
            EventType::SysRtSensing => "sensing",
            EventType::SysRtReset => "reset",
            EventType::Dummy => "dummy",
            EventType::SceneSwitch => "scene_switch",
            EventType::SubSceneSwitch => "subscene_switch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_TYPES.iter().copied().find(|kind| kind.name() == name)
    }
}

/// Bitmask over [`EventType`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EventTypes(u32);

impl EventTypes {
    pub const NONE: Self = Self(0);
    pub const NOTEON: Self = EventType::NoteOn.mask();
    pub const NOTEOFF: Self = EventType::NoteOff.mask();
    pub const NOTE: Self = Self(Self::NOTEON.0 | Self::NOTEOFF.0);
    pub const CTRL: Self = EventType::Ctrl.mask();
    pub const PITCHBEND: Self = EventType::Pitchbend.mask();
    pub const AFTERTOUCH: Self = EventType::Aftertouch.mask();
    pub const POLY_AFTERTOUCH: Self = EventType::PolyAftertouch.mask();
    pub const PROGRAM: Self = EventType::Program.mask();
    pub const SYSEX: Self = EventType::SysEx.mask();
    pub const SYSCM: Self = Self(
        EventType::SysCmQFrame.mask().0
            | EventType::SysCmSongPos.mask().0
            | EventType::SysCmSongSel.mask().0
            | EventType::SysCmTuneReq.mask().0,
    );
    pub const SYSRT: Self = Self(
        EventType::SysRtClock.mask().0
            | EventType::SysRtStart.mask().0
            | EventType::SysRtContinue.mask().0
            | EventType::SysRtStop.mask().0
            | EventType::SysRtSensing.mask().0
            | EventType::SysRtReset.mask().0,
    );
    pub const SYSTEM: Self = Self(Self::SYSEX.0 | Self::SYSCM.0 | Self::SYSRT.0);
    pub const CHANNEL: Self = Self(
        Self::NOTE.0
            | Self::CTRL.0
            | Self::PITCHBEND.0
            | Self::AFTERTOUCH.0
            | Self::POLY_AFTERTOUCH.0
            | Self::PROGRAM.0,
    );
    pub const DUMMY: Self = EventType::Dummy.mask();
    pub const ANY: Self = Self((1 << ALL_TYPES.len()) - 1);

    pub const fn contains(self, kind: EventType) -> bool {
        self.0 & kind.mask().0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl From<EventType> for EventTypes {
    fn from(kind: EventType) -> Self {
        kind.mask()
    }
}

impl BitOr for EventTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for EventTypes {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for EventTypes {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ANY.0)
    }
}

impl fmt::Debug for EventTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = ALL_TYPES
            .iter()
            .filter(|kind| self.contains(**kind))
            .map(|kind| kind.name())
            .collect();
        write!(f, "EventTypes({})", names.join(" | "))
    }
}

/// Destination of a scene or subscene switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchTarget {
    Number(u32),
    Offset { offset: i32, wrap: bool },
}

/// One timed message.
///
/// Which data fields are meaningful depends on the event type; the typed
/// accessors return [`EventError::InvalidField`] rather than a default when
/// the field does not exist for this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    kind: EventType,
    port: u16,
    channel: u8,
    data1: i32,
    data2: i32,
    sysex: Option<Arc<[u8]>>,
    time: Duration,
}

impl Event {
    fn new(kind: EventType, port: u16, channel: u8, data1: i32, data2: i32) -> Self {
        Self {
            kind,
            port,
            channel: channel & 0x0f,
            data1,
            data2,
            sysex: None,
            time: Duration::ZERO,
        }
    }

    pub fn note_on(port: u16, channel: u8, note: i32, velocity: i32) -> Self {
        Self::new(EventType::NoteOn, port, channel, note, velocity)
    }

    pub fn note_off(port: u16, channel: u8, note: i32, velocity: i32) -> Self {
        Self::new(EventType::NoteOff, port, channel, note, velocity)
    }

    pub fn control_change(port: u16, channel: u8, ctrl: i32, value: i32) -> Self {
        Self::new(EventType::Ctrl, port, channel, ctrl, value)
    }

    pub fn program_change(port: u16, channel: u8, program: i32) -> Self {
        Self::new(EventType::Program, port, channel, 0, program)
    }

    pub fn pitchbend(port: u16, channel: u8, value: i32) -> Self {
        Self::new(EventType::Pitchbend, port, channel, 0, value)
    }

    pub fn aftertouch(port: u16, channel: u8, value: i32) -> Self {
        Self::new(EventType::Aftertouch, port, channel, 0, value)
    }

    pub fn poly_aftertouch(port: u16, channel: u8, note: i32, value: i32) -> Self {
        Self::new(EventType::PolyAftertouch, port, channel, note, value)
    }

    /// System exclusive message. The payload must start with `0xf0`; the
    /// trailing `0xf7` is optional and the bytes are otherwise opaque.
    pub fn sysex(port: u16, data: impl Into<Vec<u8>>) -> Result<Self, EventError> {
        let data = data.into();
        if data.first() != Some(&0xf0) {
            return Err(EventError::InvalidSysEx(data));
        }
        let mut event = Self::new(EventType::SysEx, port, 0, 0, 0);
        event.sysex = Some(data.into());
        Ok(event)
    }

    /// System common or realtime message.
    pub fn system(kind: EventType, port: u16, data1: i32, data2: i32) -> Self {
        Self::new(kind, port, 0, data1, data2)
    }

    pub fn dummy() -> Self {
        Self::new(EventType::Dummy, 0, 0, 0, 0)
    }

    pub(crate) fn switch(kind: EventType, port: u16, target: SwitchTarget) -> Self {
        let (data1, data2) = match target {
            // bit-for-bit, decoded back in `switch_target`
            SwitchTarget::Number(n) => (n as i32, 0),
            SwitchTarget::Offset { offset, wrap } => (offset, 1 | (i32::from(wrap) << 1)),
        };
        Self::new(kind, port, 0, data1, data2)
    }

    pub fn at(mut self, time: Duration) -> Self {
        self.time = time;
        self
    }

    pub fn kind(&self) -> EventType {
        self.kind
    }

    pub fn is(&self, types: EventTypes) -> bool {
        types.contains(self.kind)
    }

    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    fn check(&self, allowed: EventTypes, field: &'static str) -> Result<(), EventError> {
        if allowed.contains(self.kind) {
            Ok(())
        } else {
            Err(EventError::InvalidField {
                kind: self.kind,
                field,
            })
        }
    }

    pub fn channel(&self) -> Result<u8, EventError> {
        self.check(EventTypes::CHANNEL, "channel")?;
        Ok(self.channel)
    }

    pub fn set_channel(&mut self, channel: u8) -> Result<(), EventError> {
        self.check(EventTypes::CHANNEL, "channel")?;
        self.channel = channel & 0x0f;
        Ok(())
    }

    pub fn note(&self) -> Result<i32, EventError> {
        self.check(EventTypes::NOTE | EventTypes::POLY_AFTERTOUCH, "note")?;
        Ok(self.data1)
    }

    pub fn set_note(&mut self, note: i32) -> Result<(), EventError> {
        self.check(EventTypes::NOTE | EventTypes::POLY_AFTERTOUCH, "note")?;
        self.data1 = note;
        Ok(())
    }

    pub fn velocity(&self) -> Result<i32, EventError> {
        self.check(EventTypes::NOTE, "velocity")?;
        Ok(self.data2)
    }

    pub fn set_velocity(&mut self, velocity: i32) -> Result<(), EventError> {
        self.check(EventTypes::NOTE, "velocity")?;
        self.data2 = velocity;
        Ok(())
    }

    pub fn ctrl(&self) -> Result<i32, EventError> {
        self.check(EventTypes::CTRL, "ctrl")?;
        Ok(self.data1)
    }

    pub fn set_ctrl(&mut self, ctrl: i32) -> Result<(), EventError> {
        self.check(EventTypes::CTRL, "ctrl")?;
        self.data1 = ctrl;
        Ok(())
    }

    pub fn value(&self) -> Result<i32, EventError> {
        self.check(VALUE_TYPES, "value")?;
        Ok(self.data2)
    }

    pub fn set_value(&mut self, value: i32) -> Result<(), EventError> {
        self.check(VALUE_TYPES, "value")?;
        self.data2 = value;
        Ok(())
    }

    pub fn program(&self) -> Result<i32, EventError> {
        self.check(EventTypes::PROGRAM, "program")?;
        Ok(self.data2)
    }

    pub fn set_program(&mut self, program: i32) -> Result<(), EventError> {
        self.check(EventTypes::PROGRAM, "program")?;
        self.data2 = program;
        Ok(())
    }

    pub fn sysex_data(&self) -> Result<&[u8], EventError> {
        self.check(EventTypes::SYSEX, "sysex")?;
        Ok(self.sysex.as_deref().unwrap_or(&[]))
    }

    pub fn switch_target(&self) -> Result<SwitchTarget, EventError> {
        self.check(
            EventType::SceneSwitch.mask() | EventType::SubSceneSwitch.mask(),
            "target",
        )?;
        if self.data2 & 1 == 0 {
            Ok(SwitchTarget::Number(self.data1 as u32))
        } else {
            Ok(SwitchTarget::Offset {
                offset: self.data1,
                wrap: self.data2 & 2 != 0,
            })
        }
    }

    /// Note-on with velocity zero is a note-off.
    pub fn normalized(mut self) -> Self {
        if self.kind == EventType::NoteOn && self.data2 == 0 {
            self.kind = EventType::NoteOff;
        }
        self
    }
}

const VALUE_TYPES: EventTypes = EventTypes(
    EventTypes::CTRL.0
        | EventTypes::PITCHBEND.0
        | EventTypes::AFTERTOUCH.0
        | EventTypes::POLY_AFTERTOUCH.0,
);

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.kind.name();
        let (port, ch) = (self.port, self.channel);
        match self.kind {
            EventType::NoteOn
            | EventType::NoteOff
            | EventType::Ctrl
            | EventType::PolyAftertouch => {
                write!(f, "{name} {port} {ch} {} {}", self.data1, self.data2)
            }
            EventType::Pitchbend | EventType::Aftertouch | EventType::Program => {
                write!(f, "{name} {port} {ch} {}", self.data2)
            }
            EventType::SysEx => {
                write!(f, "{name} {port}")?;
                for byte in self.sysex.as_deref().unwrap_or(&[]) {
                    write!(f, " {byte:02x}")?;
                }
                Ok(())
            }
            EventType::SysCmQFrame | EventType::SysCmSongPos | EventType::SysCmSongSel => {
                write!(f, "{name} {port} {}", self.data1)
            }
            EventType::SceneSwitch | EventType::SubSceneSwitch => {
                write!(f, "{name} {port} {} {}", self.data1, self.data2)
            }
            EventType::Dummy => write!(f, "{name}"),
            _ => write!(f, "{name} {port}"),
        }
    }
}

impl FromStr for Event {
    type Err = EventError;

    /// Parses the compact form produced by `Display`, e.g. `note_on 0 0 60 100`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| EventError::Parse {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let mut parts = input.split_whitespace();
        let name = parts.next().ok_or_else(|| fail("empty input"))?;
        let kind = EventType::from_name(name).ok_or_else(|| fail("unknown event type"))?;
        if kind == EventType::Dummy {
            return Ok(Event::dummy());
        }
        let rest: Vec<&str> = parts.collect();

        if kind == EventType::SysEx {
            let (port, bytes) = rest.split_first().ok_or_else(|| fail("missing port"))?;
            let port = port.parse().map_err(|_| fail("invalid port"))?;
            let data = bytes
                .iter()
                .map(|b| u8::from_str_radix(b, 16).map_err(|_| fail("invalid sysex byte")))
                .collect::<Result<Vec<u8>, _>>()?;
            return Event::sysex(port, data);
        }

        // the note field also takes a name such as `c#4`
        let has_note = (EventTypes::NOTE | EventTypes::POLY_AFTERTOUCH).contains(kind);
        let numbers = rest
            .iter()
            .enumerate()
            .map(|(i, part)| match part.parse::<i32>() {
                Ok(number) => Ok(number),
                Err(_) if i == 2 && has_note => note_number(part),
                Err(_) => Err(fail("invalid number")),
            })
            .collect::<Result<Vec<i32>, _>>()?;
        let arg = |i: usize| numbers.get(i).copied().ok_or_else(|| fail("missing field"));
        let port = u16::try_from(arg(0)?).map_err(|_| fail("invalid port"))?;

        if kind.has_channel() {
            let ch = u8::try_from(arg(1)?)
                .ok()
                .filter(|ch| *ch < 16)
                .ok_or_else(|| fail("invalid channel"))?;
            return Ok(match kind {
                EventType::NoteOn => Event::note_on(port, ch, arg(2)?, arg(3)?),
                EventType::NoteOff => Event::note_off(port, ch, arg(2)?, arg(3)?),
                EventType::Ctrl => Event::control_change(port, ch, arg(2)?, arg(3)?),
                EventType::PolyAftertouch => Event::poly_aftertouch(port, ch, arg(2)?, arg(3)?),
                EventType::Pitchbend => Event::pitchbend(port, ch, arg(2)?),
                EventType::Aftertouch => Event::aftertouch(port, ch, arg(2)?),
                _ => Event::program_change(port, ch, arg(2)?),
            });
        }

        Ok(match kind {
            EventType::SysCmQFrame | EventType::SysCmSongPos | EventType::SysCmSongSel => {
                Event::system(kind, port, arg(1)?, 0)
            }
            EventType::SceneSwitch | EventType::SubSceneSwitch => {
                Event::system(kind, port, arg(1)?, arg(2)?)
            }
            _ => Event::system(kind, port, 0, 0),
        })
    }
}
