use crate::events::{Event, EventType, SwitchTarget};
use crate::patch::Node;
use crate::units::Unit;

/// Replaces the incoming event with a scene or subscene switch request. The
/// engine applies the switch once the current event has been routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchUnit {
    Scene(SwitchTarget),
    /// Switches to the scene numbered like the incoming program change.
    SceneFromProgram,
    Subscene(SwitchTarget),
}

impl Unit for SwitchUnit {
    fn process(&self, event: Event) -> Vec<Event> {
        let port = event.port();
        let marker = match *self {
            SwitchUnit::Scene(target) => Event::switch(EventType::SceneSwitch, port, target),
            SwitchUnit::SceneFromProgram => match event.program().map(u32::try_from) {
                Ok(Ok(program)) => {
                    Event::switch(EventType::SceneSwitch, port, SwitchTarget::Number(program))
                }
                _ => return Vec::new(),
            },
            SwitchUnit::Subscene(target) => Event::switch(EventType::SubSceneSwitch, port, target),
        };
        vec![marker.at(event.time())]
    }
}

pub fn scene_switch(target: SwitchTarget) -> Node {
    Node::unit(SwitchUnit::Scene(target))
}

/// Program changes select the scene of the same number; other events are
/// dropped.
pub fn scene_switch_from_program() -> Node {
    Node::unit(SwitchUnit::SceneFromProgram)
}

pub fn subscene_switch(target: SwitchTarget) -> Node {
    Node::unit(SwitchUnit::Subscene(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_change_picks_the_scene() {
        let out = SwitchUnit::SceneFromProgram.process(Event::program_change(0, 0, 4));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), EventType::SceneSwitch);
        assert_eq!(out[0].switch_target(), Ok(SwitchTarget::Number(4)));
        assert!(
            SwitchUnit::SceneFromProgram
                .process(Event::note_on(0, 0, 60, 1))
                .is_empty()
        );
    }

    #[test]
    fn negative_programs_select_nothing() {
        assert!(
            SwitchUnit::SceneFromProgram
                .process(Event::program_change(0, 0, -5))
                .is_empty()
        );
    }

    #[test]
    fn large_scene_numbers_survive_the_marker() {
        for number in [0, 127, i32::MAX as u32 + 1, u32::MAX] {
            let target = SwitchTarget::Number(number);
            let out = SwitchUnit::Scene(target).process(Event::dummy());
            assert_eq!(out[0].switch_target(), Ok(target));
        }
    }

    #[test]
    fn relative_targets_survive_the_marker() {
        let target = SwitchTarget::Offset {
            offset: -1,
            wrap: true,
        };
        let out = SwitchUnit::Subscene(target).process(Event::dummy());
        assert_eq!(out[0].kind(), EventType::SubSceneSwitch);
        assert_eq!(out[0].switch_target(), Ok(target));
    }
}
