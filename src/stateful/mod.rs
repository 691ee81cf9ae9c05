//! Per-channel automata.
//!
//! Every unit in this module keeps one small state machine per
//! `(port, channel)` pair, created the first time that pair shows up.

mod floating_split;
mod latch;
mod pedal;
mod polyphony;
mod voices;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::events::Event;
use crate::units::Unit;

pub use floating_split::{floating_key_split, FloatingSplitConfig};
pub use latch::latch_notes;
pub use pedal::{sostenuto_pedal, sustain_pedal};
pub use polyphony::{limit_polyphony, make_monophonic};
pub use voices::{voice_filter, voice_split, VoiceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub port: u16,
    pub channel: u8,
}

impl ChannelKey {
    /// `None` for events that carry no channel.
    pub fn of(event: &Event) -> Option<Self> {
        let channel = event.channel().ok()?;
        Some(Self {
            port: event.port(),
            channel,
        })
    }
}

/// A state machine driven by the events of a single channel.
pub trait Automaton: Send + 'static {
    fn process(&mut self, event: Event) -> Vec<Event>;
}

struct ChannelTable<A> {
    index: HashMap<ChannelKey, usize>,
    automata: Vec<A>,
}

/// Dispatches each event to the automaton owning its channel, creating it
/// from `factory` on first use. Entries live as long as the unit.
///
/// Clones share the same table, which lets several units observe one set of
/// automata.
pub struct PerChannel<A> {
    factory: Arc<dyn Fn() -> A + Send + Sync>,
    table: Arc<Mutex<ChannelTable<A>>>,
}

impl<A> PerChannel<A> {
    pub fn new(factory: impl Fn() -> A + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            table: Arc::new(Mutex::new(ChannelTable {
                index: HashMap::new(),
                automata: Vec::new(),
            })),
        }
    }

    pub fn with<R>(&self, key: ChannelKey, f: impl FnOnce(&mut A) -> R) -> R {
        let mut guard = self.table.lock();
        let table = &mut *guard;
        let slot = match table.index.get(&key).copied() {
            Some(slot) => slot,
            None => {
                let slot = table.automata.len();
                table.automata.push((self.factory)());
                table.index.insert(key, slot);
                debug!(port = key.port, channel = key.channel, "new channel automaton");
                slot
            }
        };
        f(&mut table.automata[slot])
    }

    /// Number of channels seen so far.
    pub fn len(&self) -> usize {
        self.table.lock().automata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A> Clone for PerChannel<A> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            table: Arc::clone(&self.table),
        }
    }
}

impl<A> fmt::Debug for PerChannel<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerChannel")
            .field("automaton", &std::any::type_name::<A>())
            .field("channels", &self.len())
            .finish()
    }
}

impl<A: Automaton> Unit for PerChannel<A> {
    fn process(&self, event: Event) -> Vec<Event> {
        match ChannelKey::of(&event) {
            Some(key) => self.with(key, |automaton| automaton.process(event)),
            None => vec![event],
        }
    }
}

/// Note-on on the template's port, channel and time.
fn note_on_like(template: &Event, note: i32, velocity: i32) -> Event {
    let channel = template.channel().unwrap_or(0);
    Event::note_on(template.port(), channel, note, velocity).at(template.time())
}

/// Note-off with zero velocity on the template's port, channel and time.
fn note_off_like(template: &Event, note: i32) -> Event {
    let channel = template.channel().unwrap_or(0);
    Event::note_off(template.port(), channel, note, 0).at(template.time())
}
