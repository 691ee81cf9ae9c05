use super::{note_off_like, note_on_like, Automaton, PerChannel};
use crate::error::PatchError;
use crate::events::{Event, EventType};
use crate::patch::Node;

#[derive(Debug)]
struct PolyphonyLimiter {
    max: usize,
    remove_oldest: bool,
    /// Sounding notes, oldest first.
    notes: Vec<i32>,
}

impl Automaton for PolyphonyLimiter {
    fn process(&mut self, event: Event) -> Vec<Event> {
        match (event.kind(), event.note()) {
            (EventType::NoteOn, Ok(note)) => {
                // a repeated note moves to the back without taking a new slot
                self.notes.retain(|&n| n != note);
                if self.notes.len() < self.max {
                    self.notes.push(note);
                    return vec![event];
                }
                if !self.remove_oldest {
                    return Vec::new();
                }
                let oldest = self.notes.remove(0);
                self.notes.push(note);
                vec![note_off_like(&event, oldest), event]
            }
            (EventType::NoteOff, Ok(note)) => {
                let before = self.notes.len();
                self.notes.retain(|&n| n != note);
                if self.notes.len() < before {
                    vec![event]
                } else {
                    Vec::new()
                }
            }
            _ => vec![event],
        }
    }
}

/// Keeps at most `max` notes sounding per channel. Extra note-ons are dropped,
/// or evict the oldest note when `remove_oldest` is set. Note-offs for notes
/// that never sounded or were evicted are dropped.
pub fn limit_polyphony(max: usize, remove_oldest: bool) -> Result<Node, PatchError> {
    if max == 0 {
        return Err(PatchError::OutOfRange {
            what: "polyphony",
            value: 0,
        });
    }
    Ok(Node::unit(PerChannel::new(move || PolyphonyLimiter {
        max,
        remove_oldest,
        notes: Vec::new(),
    })))
}

#[derive(Debug, Default)]
struct Monophonizer {
    /// Held notes with their velocity, most recent last. The last one is the
    /// sounding note.
    held: Vec<(i32, i32)>,
}

impl Automaton for Monophonizer {
    fn process(&mut self, event: Event) -> Vec<Event> {
        match (event.kind(), event.note()) {
            (EventType::NoteOn, Ok(note)) => {
                let mut out = Vec::with_capacity(2);
                if let Some(&(sounding, _)) = self.held.last() {
                    out.push(note_off_like(&event, sounding));
                }
                self.held.retain(|&(n, _)| n != note);
                self.held.push((note, event.velocity().unwrap_or(0)));
                out.push(event);
                out
            }
            (EventType::NoteOff, Ok(note)) => {
                let sounding = self.held.last().map(|&(n, _)| n);
                self.held.retain(|&(n, _)| n != note);
                if sounding != Some(note) {
                    return Vec::new();
                }
                let mut out = vec![event];
                if let Some(&(next, velocity)) = self.held.last() {
                    let on = note_on_like(&out[0], next, velocity);
                    out.push(on);
                }
                out
            }
            _ => vec![event],
        }
    }
}

/// At most one sounding note per channel. Releasing the sounding note falls
/// back to the most recent note still held.
pub fn make_monophonic() -> Node {
    Node::unit(PerChannel::new(Monophonizer::default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    fn limiter(max: usize, remove_oldest: bool) -> PerChannel<PolyphonyLimiter> {
        PerChannel::new(move || PolyphonyLimiter {
            max,
            remove_oldest,
            notes: Vec::new(),
        })
    }

    #[test]
    fn single_voice_evicts_oldest() {
        let unit = limiter(1, true);
        assert_eq!(
            unit.process(Event::note_on(0, 0, 60, 100)),
            vec![Event::note_on(0, 0, 60, 100)]
        );
        assert_eq!(
            unit.process(Event::note_on(0, 0, 64, 100)),
            vec![Event::note_off(0, 0, 60, 0), Event::note_on(0, 0, 64, 100)]
        );
        // 60 was already released by the limiter
        assert!(unit.process(Event::note_off(0, 0, 60, 0)).is_empty());
        assert_eq!(
            unit.process(Event::note_off(0, 0, 64, 0)),
            vec![Event::note_off(0, 0, 64, 0)]
        );
    }

    #[test]
    fn full_limiter_drops_new_notes() {
        let unit = limiter(2, false);
        unit.process(Event::note_on(0, 0, 60, 100));
        unit.process(Event::note_on(0, 0, 62, 100));
        assert!(unit.process(Event::note_on(0, 0, 64, 100)).is_empty());
        assert!(unit.process(Event::note_off(0, 0, 64, 0)).is_empty());
        unit.process(Event::note_off(0, 0, 60, 0));
        assert_eq!(
            unit.process(Event::note_on(0, 0, 64, 100)),
            vec![Event::note_on(0, 0, 64, 100)]
        );
    }

    #[test]
    fn repeated_note_does_not_take_a_second_slot() {
        let unit = limiter(2, true);
        unit.process(Event::note_on(0, 0, 60, 100));
        unit.process(Event::note_on(0, 0, 62, 100));
        assert_eq!(
            unit.process(Event::note_on(0, 0, 60, 90)),
            vec![Event::note_on(0, 0, 60, 90)]
        );
        // 62 is now the oldest
        assert_eq!(
            unit.process(Event::note_on(0, 0, 64, 100)),
            vec![Event::note_off(0, 0, 62, 0), Event::note_on(0, 0, 64, 100)]
        );
    }

    #[test]
    fn zero_polyphony_is_rejected() {
        assert!(limit_polyphony(0, true).is_err());
    }

    #[test]
    fn monophonic_falls_back_to_previous_note() {
        let unit = PerChannel::new(Monophonizer::default);
        unit.process(Event::note_on(0, 0, 60, 100));
        assert_eq!(
            unit.process(Event::note_on(0, 0, 64, 80)),
            vec![Event::note_off(0, 0, 60, 0), Event::note_on(0, 0, 64, 80)]
        );
        assert_eq!(
            unit.process(Event::note_off(0, 0, 64, 0)),
            vec![Event::note_off(0, 0, 64, 0), Event::note_on(0, 0, 60, 100)]
        );
        assert_eq!(
            unit.process(Event::note_off(0, 0, 60, 0)),
            vec![Event::note_off(0, 0, 60, 0)]
        );
    }

    #[test]
    fn monophonic_drops_offs_of_silent_notes() {
        let unit = PerChannel::new(Monophonizer::default);
        unit.process(Event::note_on(0, 0, 60, 100));
        unit.process(Event::note_on(0, 0, 64, 100));
        assert!(unit.process(Event::note_off(0, 0, 60, 0)).is_empty());
        assert_eq!(
            unit.process(Event::note_off(0, 0, 64, 0)),
            vec![Event::note_off(0, 0, 64, 0)]
        );
    }
}
