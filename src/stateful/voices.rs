use std::collections::BTreeMap;
use std::time::Duration;

use super::{note_off_like, note_on_like, Automaton, PerChannel};
use crate::events::{Event, EventType};
use crate::patch::{fork, Node};

/// Voice allocation settings. `voice` indexes the sorted held notes: 0 is the
/// lowest, -1 the highest, other negatives count down from the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceConfig {
    pub voice: i32,
    /// A note-on this recent may still steal the voice from a held note.
    pub hold: Duration,
    /// Re-trigger on every voice change, even when the new note is old.
    pub retrigger: bool,
}

impl VoiceConfig {
    pub fn new(voice: i32) -> Self {
        Self {
            voice,
            hold: Duration::from_millis(500),
            retrigger: false,
        }
    }
}

#[derive(Debug)]
struct VoiceAllocator {
    config: VoiceConfig,
    /// Held notes, mapped to velocity and onset time.
    held: BTreeMap<i32, (i32, Duration)>,
    current: Option<i32>,
    diverted: bool,
}

impl VoiceAllocator {
    fn new(config: VoiceConfig) -> Self {
        Self {
            config,
            held: BTreeMap::new(),
            current: None,
            diverted: false,
        }
    }

    fn is_boundary(&self) -> bool {
        self.config.voice == 0 || self.config.voice == -1
    }

    /// The note the voice should sound now, and whether it had to fall back
    /// to the nearest note because the requested index is not held.
    fn target(&self) -> (Option<i32>, bool) {
        let notes: Vec<i32> = self.held.keys().copied().collect();
        let len = notes.len() as i32;
        let index = if self.config.voice >= 0 {
            self.config.voice
        } else {
            len + self.config.voice
        };
        if (0..len).contains(&index) {
            return (Some(notes[index as usize]), false);
        }
        let nearest = if self.config.voice >= 0 {
            notes.last()
        } else {
            notes.first()
        };
        (nearest.copied(), true)
    }

    fn is_recent(&self, note: i32, now: Duration) -> bool {
        self.held
            .get(&note)
            .is_some_and(|&(_, onset)| now.saturating_sub(onset) < self.config.hold)
    }
}

impl Automaton for VoiceAllocator {
    fn process(&mut self, event: Event) -> Vec<Event> {
        let now = event.time();
        match (event.kind(), event.note()) {
            (EventType::NoteOn, Ok(note)) => {
                let velocity = event.velocity().unwrap_or(0);
                self.held.insert(note, (velocity, now));
            }
            (EventType::NoteOff, Ok(note)) => {
                self.held.remove(&note);
            }
            _ => return vec![event],
        }

        let (target, diverted) = self.target();
        let current_held = self.current.is_some_and(|n| self.held.contains_key(&n));
        let stolen = event.kind() == EventType::NoteOn
            && target.is_some_and(|n| self.is_recent(n, now));
        let change = target != self.current
            && (self.config.retrigger
                || self.is_boundary()
                || !current_held
                || stolen
                || (self.diverted && !diverted));
        if !change {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(2);
        if let Some(old) = self.current.take() {
            out.push(note_off_like(&event, old));
        }
        if let Some(note) = target {
            if self.config.retrigger || self.is_boundary() || self.is_recent(note, now) {
                let velocity = self.held.get(&note).map_or(0, |&(v, _)| v);
                out.push(note_on_like(&event, note, velocity));
                self.current = Some(note);
            }
        }
        self.diverted = diverted;
        out
    }
}

/// Passes only the notes currently owning voice `config.voice` of each
/// channel, synthesizing note-offs and note-ons as ownership moves. Other
/// events pass.
pub fn voice_filter(config: VoiceConfig) -> Node {
    Node::unit(PerChannel::new(move || VoiceAllocator::new(config)))
}

/// One voice filter per patch: the first patch gets the lowest voice, the
/// last one the highest, the ones in between count up from the bottom.
pub fn voice_split(
    patches: impl IntoIterator<Item = Node>,
    hold: Duration,
    retrigger: bool,
) -> Node {
    let patches: Vec<Node> = patches.into_iter().collect();
    let last = patches.len().saturating_sub(1);
    fork(patches.into_iter().enumerate().map(|(i, patch)| {
        let voice = if i == last && i > 0 { -1 } else { i as i32 };
        voice_filter(VoiceConfig {
            voice,
            hold,
            retrigger,
        })
        .then(patch)
    }))
}
