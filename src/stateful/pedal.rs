use std::collections::BTreeSet;

use super::{note_off_like, Automaton, PerChannel};
use crate::error::PatchError;
use crate::events::{Event, EventType};
use crate::patch::Node;

const PEDAL_DOWN: i32 = 64;

/// Which notes a pedal holds on to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PedalMode {
    /// Every note released while the pedal is down.
    Sustain,
    /// Only notes already held when the pedal went down.
    Sostenuto,
}

#[derive(Debug)]
struct Pedal {
    mode: PedalMode,
    ctrl: i32,
    down: bool,
    /// Notes currently pressed on the keyboard.
    pressed: BTreeSet<i32>,
    /// Notes eligible for holding while the pedal is down (sostenuto only).
    captured: BTreeSet<i32>,
    /// Released notes whose note-off is being withheld.
    held: BTreeSet<i32>,
}

impl Pedal {
    fn new(mode: PedalMode, ctrl: i32) -> Self {
        Self {
            mode,
            ctrl,
            down: false,
            pressed: BTreeSet::new(),
            captured: BTreeSet::new(),
            held: BTreeSet::new(),
        }
    }

    fn holds(&self, note: i32) -> bool {
        self.down
            && match self.mode {
                PedalMode::Sustain => true,
                PedalMode::Sostenuto => self.captured.contains(&note),
            }
    }

    fn pedal(&mut self, event: &Event, value: i32) -> Vec<Event> {
        let down = value >= PEDAL_DOWN;
        if down == self.down {
            return Vec::new();
        }
        self.down = down;
        if down {
            if self.mode == PedalMode::Sostenuto {
                self.captured = self.pressed.clone();
            }
            return Vec::new();
        }
        self.captured.clear();
        std::mem::take(&mut self.held)
            .into_iter()
            .map(|note| note_off_like(event, note))
            .collect()
    }
}

impl Automaton for Pedal {
    fn process(&mut self, event: Event) -> Vec<Event> {
        match event.kind() {
            EventType::Ctrl if event.ctrl() == Ok(self.ctrl) => {
                let value = event.value().unwrap_or(0);
                self.pedal(&event, value)
            }
            EventType::NoteOn => {
                let Ok(note) = event.note() else {
                    return vec![event];
                };
                self.pressed.insert(note);
                if self.held.remove(&note) {
                    // still ringing from the pedal, stop it before replaying
                    return vec![note_off_like(&event, note), event];
                }
                vec![event]
            }
            EventType::NoteOff => {
                let Ok(note) = event.note() else {
                    return vec![event];
                };
                self.pressed.remove(&note);
                if self.holds(note) {
                    self.held.insert(note);
                    return Vec::new();
                }
                vec![event]
            }
            _ => vec![event],
        }
    }
}

fn check_ctrl(ctrl: i32) -> Result<(), PatchError> {
    if !(0..128).contains(&ctrl) {
        return Err(PatchError::OutOfRange {
            what: "pedal ctrl",
            value: ctrl,
        });
    }
    Ok(())
}

/// Turns a sustain pedal on controller `ctrl` into delayed note-offs: notes
/// released while the pedal is down stop when it comes up. The pedal events
/// themselves are consumed.
pub fn sustain_pedal(ctrl: i32) -> Result<Node, PatchError> {
    check_ctrl(ctrl)?;
    Ok(Node::unit(PerChannel::new(move || {
        Pedal::new(PedalMode::Sustain, ctrl)
    })))
}

/// Like [`sustain_pedal`], but only holds the notes that were down when the
/// pedal was pressed.
pub fn sostenuto_pedal(ctrl: i32) -> Result<Node, PatchError> {
    check_ctrl(ctrl)?;
    Ok(Node::unit(PerChannel::new(move || {
        Pedal::new(PedalMode::Sostenuto, ctrl)
    })))
}
