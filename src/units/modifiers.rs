use super::Unit;
use crate::error::PatchError;
use crate::events::{Event, EventType};
use crate::patch::Node;

/// Value transfer functions shared by velocity and controller modifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    Offset(i32),
    Multiply(f32),
    Fixed(i32),
    /// `127 * (v / 127) ^ (1 / gamma)`; values above 1 boost soft input.
    Gamma(f32),
    /// Exponential curve; positive values bend towards soft, negative towards
    /// hard, zero is linear.
    Exponential(f32),
}

impl Curve {
    pub fn apply(self, value: i32) -> i32 {
        match self {
            Curve::Offset(offset) => value.saturating_add(offset),
            Curve::Multiply(factor) => (value as f32 * factor).round() as i32,
            Curve::Fixed(fixed) => fixed,
            Curve::Gamma(gamma) if gamma > 0.0 => {
                let x = value.clamp(0, 127) as f32 / 127.0;
                (x.powf(1.0 / gamma) * 127.0).round() as i32
            }
            Curve::Gamma(_) => value,
            Curve::Exponential(amount) if amount != 0.0 => {
                let x = value.clamp(0, 127) as f32 / 127.0;
                (((amount * x).exp() - 1.0) / (amount.exp() - 1.0) * 127.0).round() as i32
            }
            Curve::Exponential(_) => value,
        }
    }
}

/// Maps `value` from `[in_min, in_max]` onto `[out_min, out_max]`, clamping to
/// the output range.
fn map_range(value: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    if in_max == in_min {
        return out_min;
    }
    let t = (value as f32 - in_min as f32) / (in_max as f32 - in_min as f32);
    let mapped = (out_min as f32 + t * (out_max as f32 - out_min as f32)).round() as i32;
    mapped.clamp(out_min.min(out_max), out_min.max(out_max))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modifier {
    Port(u16),
    Channel(u8),
    Transpose(i32),
    Key(i32),
    Velocity(Curve),
    CtrlMap {
        from: i32,
        to: i32,
    },
    CtrlRange {
        ctrl: i32,
        out_min: i32,
        out_max: i32,
        in_min: i32,
        in_max: i32,
    },
    CtrlCurve {
        ctrl: i32,
        curve: Curve,
    },
    /// Scales the two halves of the bend range separately so centre stays 0.
    PitchbendRange {
        down: i32,
        up: i32,
    },
    Sanitize,
}

impl Modifier {
    fn modify(&self, mut event: Event) -> Option<Event> {
        let kind = event.kind();
        match *self {
            Modifier::Port(port) => event.set_port(port),
            Modifier::Channel(ch) => {
                if kind.has_channel() {
                    event.set_channel(ch).ok()?;
                }
            }
            Modifier::Transpose(offset) => {
                if let Ok(note) = event.note() {
                    event.set_note(note.saturating_add(offset)).ok()?;
                }
            }
            Modifier::Key(note) => {
                if event.note().is_ok() {
                    event.set_note(note).ok()?;
                }
            }
            Modifier::Velocity(curve) => {
                if kind == EventType::NoteOn {
                    let velocity = curve.apply(event.velocity().ok()?).clamp(1, 127);
                    event.set_velocity(velocity).ok()?;
                }
            }
            Modifier::CtrlMap { from, to } => {
                if event.ctrl().is_ok_and(|c| c == from) {
                    event.set_ctrl(to).ok()?;
                }
            }
            Modifier::CtrlRange {
                ctrl,
                out_min,
                out_max,
                in_min,
                in_max,
            } => {
                if event.ctrl().is_ok_and(|c| c == ctrl) {
                    let value = event.value().ok()?;
                    event
                        .set_value(map_range(value, in_min, in_max, out_min, out_max))
                        .ok()?;
                }
            }
            Modifier::CtrlCurve { ctrl, curve } => {
                if event.ctrl().is_ok_and(|c| c == ctrl) {
                    let value = curve.apply(event.value().ok()?).clamp(0, 127);
                    event.set_value(value).ok()?;
                }
            }
            Modifier::PitchbendRange { down, up } => {
                if kind == EventType::Pitchbend {
                    let value = event.value().ok()?;
                    let scaled = if value < 0 {
                        map_range(value, -8192, 0, down.saturating_neg(), 0)
                    } else {
                        map_range(value, 0, 8191, 0, up)
                    };
                    event.set_value(scaled).ok()?;
                }
            }
            Modifier::Sanitize => return sanitized(event),
        }
        Some(event)
    }
}

/// Drops events whose addressing data is out of range and clamps values.
fn sanitized(mut event: Event) -> Option<Event> {
    match event.kind() {
        EventType::NoteOn | EventType::NoteOff => {
            if !(0..128).contains(&event.note().ok()?) {
                return None;
            }
            let velocity = event.velocity().ok()?.clamp(0, 127);
            event.set_velocity(velocity).ok()?;
        }
        EventType::PolyAftertouch => {
            if !(0..128).contains(&event.note().ok()?) {
                return None;
            }
            let value = event.value().ok()?.clamp(0, 127);
            event.set_value(value).ok()?;
        }
        EventType::Ctrl => {
            if !(0..128).contains(&event.ctrl().ok()?) {
                return None;
            }
            let value = event.value().ok()?.clamp(0, 127);
            event.set_value(value).ok()?;
        }
        EventType::Aftertouch => {
            let value = event.value().ok()?.clamp(0, 127);
            event.set_value(value).ok()?;
        }
        EventType::Pitchbend => {
            let value = event.value().ok()?.clamp(-8192, 8191);
            event.set_value(value).ok()?;
        }
        EventType::Program => {
            if !(0..128).contains(&event.program().ok()?) {
                return None;
            }
        }
        EventType::Dummy => return None,
        _ => {}
    }
    Some(event)
}

impl Unit for Modifier {
    fn process(&self, event: Event) -> Vec<Event> {
        self.modify(event).into_iter().collect()
    }
}

fn data_byte(what: &'static str, value: i32) -> Result<i32, PatchError> {
    if (0..128).contains(&value) {
        Ok(value)
    } else {
        Err(PatchError::OutOfRange { what, value })
    }
}

pub fn port(port: u16) -> Node {
    Node::unit(Modifier::Port(port))
}

pub fn channel(channel: u8) -> Result<Node, PatchError> {
    if channel > 15 {
        return Err(PatchError::OutOfRange {
            what: "channel",
            value: i32::from(channel),
        });
    }
    Ok(Node::unit(Modifier::Channel(channel)))
}

pub fn transpose(offset: i32) -> Node {
    Node::unit(Modifier::Transpose(offset))
}

/// Sets every note event to `note`.
pub fn key(note: i32) -> Result<Node, PatchError> {
    Ok(Node::unit(Modifier::Key(data_byte("note", note)?)))
}

pub fn velocity(curve: Curve) -> Node {
    Node::unit(Modifier::Velocity(curve))
}

pub fn ctrl_map(from: i32, to: i32) -> Result<Node, PatchError> {
    Ok(Node::unit(Modifier::CtrlMap {
        from: data_byte("ctrl", from)?,
        to: data_byte("ctrl", to)?,
    }))
}

/// Rescales controller `ctrl` from `[in_min, in_max]` to `[out_min, out_max]`.
pub fn ctrl_range(
    ctrl: i32,
    (out_min, out_max): (i32, i32),
    (in_min, in_max): (i32, i32),
) -> Result<Node, PatchError> {
    if in_min == in_max {
        return Err(PatchError::InvalidRange {
            what: "ctrl range input",
            lo: in_min,
            hi: in_max,
        });
    }
    Ok(Node::unit(Modifier::CtrlRange {
        ctrl: data_byte("ctrl", ctrl)?,
        out_min,
        out_max,
        in_min,
        in_max,
    }))
}

pub fn ctrl_curve(ctrl: i32, curve: Curve) -> Result<Node, PatchError> {
    Ok(Node::unit(Modifier::CtrlCurve {
        ctrl: data_byte("ctrl", ctrl)?,
        curve,
    }))
}

/// Rescales pitch bend so full deflection reaches `-down` and `up`.
pub fn pitchbend_range(down: i32, up: i32) -> Node {
    Node::unit(Modifier::PitchbendRange { down, up })
}

pub fn sanitize() -> Node {
    Node::unit(Modifier::Sanitize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(modifier: Modifier, event: Event) -> Vec<Event> {
        modifier.process(event)
    }

    #[test]
    fn transpose_touches_only_notes() {
        assert_eq!(
            run(Modifier::Transpose(12), Event::note_on(0, 0, 60, 90)),
            vec![Event::note_on(0, 0, 72, 90)]
        );
        let ctrl = Event::control_change(0, 0, 7, 90);
        assert_eq!(run(Modifier::Transpose(12), ctrl.clone()), vec![ctrl]);
    }

    #[test]
    fn channel_leaves_system_events_alone() {
        let clock = Event::system(EventType::SysRtClock, 0, 0, 0);
        assert_eq!(run(Modifier::Channel(5), clock.clone()), vec![clock]);
        assert_eq!(
            run(Modifier::Channel(5), Event::program_change(0, 0, 1)),
            vec![Event::program_change(0, 5, 1)]
        );
    }

    #[test]
    fn velocity_curves() {
        assert_eq!(Curve::Offset(10).apply(100), 110);
        assert_eq!(Curve::Multiply(0.5).apply(100), 50);
        assert_eq!(Curve::Fixed(64).apply(3), 64);
        assert_eq!(Curve::Gamma(1.0).apply(77), 77);
        assert!(Curve::Gamma(2.0).apply(32) > 32);
        assert_eq!(Curve::Exponential(0.0).apply(40), 40);
        assert!(Curve::Exponential(2.0).apply(64) < 64);
        assert_eq!(Curve::Exponential(2.0).apply(127), 127);
    }

    #[test]
    fn velocity_never_turns_note_on_into_note_off() {
        assert_eq!(
            run(Modifier::Velocity(Curve::Offset(-200)), Event::note_on(0, 0, 60, 90)),
            vec![Event::note_on(0, 0, 60, 1)]
        );
        let off = Event::note_off(0, 0, 60, 40);
        assert_eq!(run(Modifier::Velocity(Curve::Fixed(1)), off.clone()), vec![off]);
    }

    #[test]
    fn ctrl_range_rescales() {
        let modifier = Modifier::CtrlRange {
            ctrl: 7,
            out_min: 20,
            out_max: 40,
            in_min: 0,
            in_max: 127,
        };
        assert_eq!(
            run(modifier, Event::control_change(0, 0, 7, 127)),
            vec![Event::control_change(0, 0, 7, 40)]
        );
        assert_eq!(
            run(modifier, Event::control_change(0, 0, 7, 0)),
            vec![Event::control_change(0, 0, 7, 20)]
        );
        assert_eq!(
            run(modifier, Event::control_change(0, 0, 8, 0)),
            vec![Event::control_change(0, 0, 8, 0)]
        );
    }

    #[test]
    fn pitchbend_range_keeps_centre() {
        let modifier = Modifier::PitchbendRange { down: 4096, up: 100 };
        assert_eq!(
            run(modifier, Event::pitchbend(0, 0, 0)),
            vec![Event::pitchbend(0, 0, 0)]
        );
        assert_eq!(
            run(modifier, Event::pitchbend(0, 0, -8192)),
            vec![Event::pitchbend(0, 0, -4096)]
        );
        assert_eq!(
            run(modifier, Event::pitchbend(0, 0, 8191)),
            vec![Event::pitchbend(0, 0, 100)]
        );
    }

    #[test]
    fn sanitize_drops_and_clamps() {
        assert!(run(Modifier::Sanitize, Event::note_on(0, 0, 130, 90)).is_empty());
        assert!(run(Modifier::Sanitize, Event::dummy()).is_empty());
        assert_eq!(
            run(Modifier::Sanitize, Event::control_change(0, 0, 1, 300)),
            vec![Event::control_change(0, 0, 1, 127)]
        );
        assert_eq!(
            run(Modifier::Sanitize, Event::pitchbend(0, 0, 9000)),
            vec![Event::pitchbend(0, 0, 8191)]
        );
    }

    #[test]
    fn huge_offsets_saturate_and_sanitize_drops_them() {
        let out = run(Modifier::Transpose(i32::MAX), Event::note_on(0, 0, 60, 100));
        assert_eq!(out, vec![Event::note_on(0, 0, i32::MAX, 100)]);
        assert!(run(Modifier::Sanitize, out[0].clone()).is_empty());

        assert_eq!(
            run(Modifier::Transpose(i32::MIN), Event::note_off(0, 0, -1, 0)),
            vec![Event::note_off(0, 0, i32::MIN, 0)]
        );
        assert_eq!(
            run(
                Modifier::Velocity(Curve::Offset(i32::MAX)),
                Event::note_on(0, 0, 60, 100)
            ),
            vec![Event::note_on(0, 0, 60, 127)]
        );
        assert_eq!(
            run(
                Modifier::CtrlCurve {
                    ctrl: 7,
                    curve: Curve::Offset(i32::MIN)
                },
                Event::control_change(0, 0, 7, -1)
            ),
            vec![Event::control_change(0, 0, 7, 0)]
        );
    }

    #[test]
    fn builders_validate() {
        assert!(channel(16).is_err());
        assert!(key(128).is_err());
        assert!(ctrl_map(1, 200).is_err());
        assert!(ctrl_range(7, (0, 10), (5, 5)).is_err());
    }
}
