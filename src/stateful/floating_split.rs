use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{Automaton, ChannelKey, PerChannel};
use crate::error::PatchError;
use crate::events::{Event, EventType, EventTypes};
use crate::patch::{chain, fork, Node};
use crate::units::Unit;

/// Where a floating split may move and how it reacts to playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatingSplitConfig {
    /// The split point never goes below this note.
    pub lower_bound: i32,
    /// The split point never goes above this note.
    pub upper_bound: i32,
    /// How long a released note keeps pulling on the split.
    pub hold_time: Duration,
    /// Room left above the lower hand when only it is playing.
    pub margin_lower: i32,
    /// Room left below the upper hand when only it is playing.
    pub margin_upper: i32,
}

impl FloatingSplitConfig {
    pub fn new(lower_bound: i32, upper_bound: i32) -> Self {
        Self {
            lower_bound,
            upper_bound,
            hold_time: Duration::from_secs(1),
            margin_lower: 12,
            margin_upper: 12,
        }
    }

    fn home(&self) -> i32 {
        (self.lower_bound + self.upper_bound) / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lower,
    Upper,
}

/// Recently played notes per side, mapped to their release time (`None`
/// while still held).
type Recent = BTreeMap<i32, Option<Duration>>;

#[derive(Debug)]
struct SplitAnalyzer {
    config: FloatingSplitConfig,
    threshold: i32,
    lower: Recent,
    upper: Recent,
    /// Side each note was last routed to, so note-offs follow their note-on.
    sides: HashMap<i32, Side>,
}

impl SplitAnalyzer {
    fn new(config: FloatingSplitConfig) -> Self {
        Self {
            config,
            threshold: config.home(),
            lower: Recent::new(),
            upper: Recent::new(),
            sides: HashMap::new(),
        }
    }

    fn side_of(&self, note: i32) -> Side {
        match self.sides.get(&note) {
            Some(&side) => side,
            None if note < self.threshold => Side::Lower,
            None => Side::Upper,
        }
    }

    fn recent(&mut self, side: Side) -> &mut Recent {
        match side {
            Side::Lower => &mut self.lower,
            Side::Upper => &mut self.upper,
        }
    }

    fn prune(&mut self, now: Duration) {
        let hold = self.config.hold_time;
        let fresh = |release: &mut Option<Duration>| {
            release.is_none_or(|t| now.saturating_sub(t) < hold)
        };
        self.lower.retain(|_, release| fresh(release));
        self.upper.retain(|_, release| fresh(release));
    }

    fn update_threshold(&mut self) {
        let config = &self.config;
        let max_lower = self.lower.keys().next_back().copied();
        let min_upper = self.upper.keys().next().copied();
        let threshold = match (max_lower, min_upper) {
            (Some(lo), Some(hi)) => (lo + hi + 1) / 2,
            (Some(lo), None) => lo + 1 + config.margin_lower,
            (None, Some(hi)) => hi - config.margin_upper,
            (None, None) => config.home(),
        };
        let mut threshold = threshold.clamp(config.lower_bound, config.upper_bound);

        // held notes stay on their side whatever the bounds say
        let held_lower = self.lower.iter().rev().find(|(_, r)| r.is_none());
        if let Some((&lo, _)) = held_lower {
            threshold = threshold.max(lo + 1);
        }
        let held_upper = self.upper.iter().find(|(_, r)| r.is_none());
        if let Some((&hi, _)) = held_upper {
            threshold = threshold.min(hi);
        }
        self.threshold = threshold;
    }
}

impl Automaton for SplitAnalyzer {
    fn process(&mut self, event: Event) -> Vec<Event> {
        let now = event.time();
        let (kind, note) = match (event.kind(), event.note()) {
            (kind @ (EventType::NoteOn | EventType::NoteOff), Ok(note)) => (kind, note),
            _ => return vec![event],
        };
        self.prune(now);
        self.update_threshold();

        if kind == EventType::NoteOn {
            let side = if note < self.threshold {
                Side::Lower
            } else {
                Side::Upper
            };
            self.lower.remove(&note);
            self.upper.remove(&note);
            self.recent(side).insert(note, None);
            self.sides.insert(note, side);
        } else if let Some(side) = self.sides.get(&note).copied() {
            if let Some(release) = self.recent(side).get_mut(&note) {
                *release = Some(now);
            }
        }
        self.update_threshold();
        vec![event]
    }
}

/// Passes notes routed to one side of the split. Other events pass.
#[derive(Debug)]
struct FloatingSide {
    side: Side,
    analyzer: PerChannel<SplitAnalyzer>,
}

impl Unit for FloatingSide {
    fn process(&self, event: Event) -> Vec<Event> {
        let (Some(key), Ok(note)) = (ChannelKey::of(&event), event.note()) else {
            return vec![event];
        };
        if !event.is(EventTypes::NOTE) {
            return vec![event];
        }
        if self.analyzer.with(key, |a| a.side_of(note)) == self.side {
            vec![event]
        } else {
            Vec::new()
        }
    }
}

/// Keyboard split whose split point follows the hands: it settles between
/// the lowest recent upper-hand note and the highest recent lower-hand note,
/// within the configured bounds, and never crosses a held note.
pub fn floating_key_split(
    config: FloatingSplitConfig,
    lower: Node,
    upper: Node,
) -> Result<Node, PatchError> {
    let FloatingSplitConfig {
        lower_bound,
        upper_bound,
        ..
    } = config;
    if lower_bound < 0 || upper_bound > 128 || lower_bound > upper_bound {
        return Err(PatchError::InvalidRange {
            what: "floating split bounds",
            lo: lower_bound,
            hi: upper_bound,
        });
    }
    if config.margin_lower < 0 || config.margin_upper < 0 {
        return Err(PatchError::InvalidRange {
            what: "floating split margins",
            lo: config.margin_lower,
            hi: config.margin_upper,
        });
    }
    let analyzer = PerChannel::new(move || SplitAnalyzer::new(config));
    let side_filter = |side| {
        Node::unit(FloatingSide {
            side,
            analyzer: analyzer.clone(),
        })
    };
    Ok(chain([
        Node::unit(analyzer.clone()),
        fork([
            side_filter(Side::Lower).then(lower),
            side_filter(Side::Upper).then(upper),
        ]),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Patch;
    use crate::settings::Settings;
    use crate::units::port;

    fn split() -> Patch {
        let node = floating_key_split(FloatingSplitConfig::new(48, 72), port(1), port(2)).unwrap();
        Patch::compile(&node, &Settings::default()).unwrap().main
    }

    fn routed(patch: &Patch, event: Event) -> Vec<u16> {
        patch.process(event).iter().map(Event::port).collect()
    }

    #[test]
    fn split_point_moves_between_the_hands() {
        let patch = split();
        assert_eq!(routed(&patch, Event::note_on(0, 0, 40, 100)), vec![1]);
        assert_eq!(routed(&patch, Event::note_on(0, 0, 55, 100)), vec![2]);
        // a static split at 60 would send this to the lower side
        assert_eq!(routed(&patch, Event::note_on(0, 0, 50, 100)), vec![2]);
        assert_eq!(routed(&patch, Event::note_off(0, 0, 40, 0)), vec![1]);
    }

    #[test]
    fn note_offs_follow_their_note_on() {
        let patch = split();
        assert_eq!(routed(&patch, Event::note_on(0, 0, 58, 100)), vec![1]);
        // the split moved up to 71, so 64 joins the lower hand
        assert_eq!(routed(&patch, Event::note_on(0, 0, 64, 100)), vec![1]);
        assert_eq!(routed(&patch, Event::note_on(0, 0, 75, 100)), vec![2]);
        assert_eq!(routed(&patch, Event::note_off(0, 0, 58, 0)), vec![1]);
        assert_eq!(routed(&patch, Event::note_off(0, 0, 64, 0)), vec![1]);
        assert_eq!(routed(&patch, Event::note_off(0, 0, 75, 0)), vec![2]);
    }

    #[test]
    fn split_returns_home_after_hold_time() {
        let patch = split();
        let at = |ms, event: Event| event.at(Duration::from_millis(ms));
        patch.process(at(0, Event::note_on(0, 0, 40, 100)));
        patch.process(at(0, Event::note_on(0, 0, 55, 100)));
        patch.process(at(10, Event::note_off(0, 0, 40, 0)));
        patch.process(at(10, Event::note_off(0, 0, 55, 0)));
        assert_eq!(routed(&patch, at(20, Event::note_on(0, 0, 50, 100))), vec![2]);
        patch.process(at(30, Event::note_off(0, 0, 50, 0)));
        assert_eq!(
            routed(&patch, at(5000, Event::note_on(0, 0, 50, 100))),
            vec![1]
        );
    }

    #[test]
    fn unbounded_hold_keeps_released_notes() {
        let config = FloatingSplitConfig {
            hold_time: Duration::MAX,
            ..FloatingSplitConfig::new(48, 72)
        };
        let node = floating_key_split(config, port(1), port(2)).unwrap();
        let patch = Patch::compile(&node, &Settings::default()).unwrap().main;
        let at = |ms, event: Event| event.at(Duration::from_millis(ms));
        patch.process(at(0, Event::note_on(0, 0, 40, 100)));
        patch.process(at(10, Event::note_off(0, 0, 40, 0)));
        // 40 still pulls the split up to 53 long after release
        assert_eq!(
            routed(&patch, at(60_000, Event::note_on(0, 0, 55, 100))),
            vec![2]
        );
    }

    #[test]
    fn other_events_reach_both_sides() {
        let patch = split();
        assert_eq!(routed(&patch, Event::control_change(0, 0, 1, 1)), vec![1, 2]);
    }

    #[test]
    fn bad_bounds_are_rejected() {
        let config = FloatingSplitConfig::new(72, 48);
        assert!(floating_key_split(config, port(1), port(2)).is_err());
    }
}
