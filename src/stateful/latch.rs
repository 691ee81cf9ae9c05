use super::{note_off_like, Automaton, PerChannel};
use crate::error::PatchError;
use crate::events::{Event, EventType};
use crate::patch::Node;

#[derive(Debug)]
struct Latch {
    polyphonic: bool,
    reset: Option<i32>,
    /// Latched notes in the order they were played.
    latched: Vec<i32>,
}

impl Latch {
    fn release_all(&mut self, template: &Event) -> Vec<Event> {
        self.latched
            .drain(..)
            .map(|note| note_off_like(template, note))
            .collect()
    }
}

impl Automaton for Latch {
    fn process(&mut self, event: Event) -> Vec<Event> {
        match (event.kind(), event.note()) {
            (EventType::NoteOn, Ok(note)) if self.reset == Some(note) => self.release_all(&event),
            (EventType::NoteOn, Ok(note)) if self.polyphonic => {
                if let Some(pos) = self.latched.iter().position(|&n| n == note) {
                    self.latched.remove(pos);
                    vec![note_off_like(&event, note)]
                } else {
                    self.latched.push(note);
                    vec![event]
                }
            }
            (EventType::NoteOn, Ok(note)) => {
                let mut out = self.release_all(&event);
                self.latched.push(note);
                out.push(event);
                out
            }
            // the latch decides when notes stop
            (EventType::NoteOff, _) => Vec::new(),
            _ => vec![event],
        }
    }
}

/// Makes notes keep sounding after release.
///
/// Polyphonic latches toggle: playing a latched note again stops it.
/// Monophonic latches stop the previous note whenever a new one starts.
/// Playing `reset` stops every latched note.
pub fn latch_notes(polyphonic: bool, reset: Option<i32>) -> Result<Node, PatchError> {
    if let Some(note) = reset.filter(|n| !(0..128).contains(n)) {
        return Err(PatchError::OutOfRange {
            what: "latch reset note",
            value: note,
        });
    }
    Ok(Node::unit(PerChannel::new(move || Latch {
        polyphonic,
        reset,
        latched: Vec::new(),
    })))
}
