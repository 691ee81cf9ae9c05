use crate::error::PatchError;
use crate::events::{Event, EventType, EventTypes, SwitchTarget};
use crate::patch::{run_stages, Node, Patch};
use crate::scene::{SceneSwitcher, SceneTable};
use crate::settings::Settings;
use crate::units::sanitize;
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the engine routes through, declared by the user.
#[derive(Debug, Clone, Default)]
pub struct EngineSetup {
    pub scenes: SceneTable,
    /// Always active, next to whatever scene is current.
    pub control: Option<Node>,
    /// Runs before every scene.
    pub pre: Option<Node>,
    /// Runs after every scene.
    pub post: Option<Node>,
}

/// Tree that is not part of any scene, with the init/exit actions found in it.
struct GlobalPatch {
    main: Patch,
    init: Option<Patch>,
    exit: Option<Patch>,
}

impl GlobalPatch {
    fn compile(node: Option<&Node>, settings: &Settings) -> Result<Option<Self>, PatchError> {
        let Some(node) = node else {
            return Ok(None);
        };
        let compiled = Patch::compile(node, settings)?;
        Ok(Some(Self {
            main: compiled.main,
            init: compiled.init,
            exit: compiled.exit,
        }))
    }
}

/// Runs events through the active scene, wrapped in the global pre and post
/// trees, with the control tree beside it. Scene switches requested by units
/// take effect after the event that requested them.
pub struct Engine {
    settings: Settings,
    switcher: SceneSwitcher,
    control: Option<GlobalPatch>,
    pre: Option<GlobalPatch>,
    post: Option<GlobalPatch>,
    sanitize: Option<Patch>,
}

impl Engine {
    pub fn new(settings: Settings, setup: EngineSetup) -> Result<Self, PatchError> {
        let switcher = SceneSwitcher::compile(&setup.scenes, &settings)?;
        let control = GlobalPatch::compile(setup.control.as_ref(), &settings)?;
        let pre = GlobalPatch::compile(setup.pre.as_ref(), &settings)?;
        let post = GlobalPatch::compile(setup.post.as_ref(), &settings)?;
        let sanitizer = if settings.sanitize {
            Some(Patch::compile(&sanitize(), &settings)?.main)
        } else {
            None
        };
        Ok(Self {
            settings,
            switcher,
            control,
            pre,
            post,
            sanitize: sanitizer,
        })
    }

    fn globals(&self) -> impl Iterator<Item = &GlobalPatch> {
        self.control.iter().chain(&self.pre).chain(&self.post)
    }

    /// Runs the global init actions and enters the initial scene.
    pub fn start(&mut self) -> Result<Vec<Event>, PatchError> {
        let mut out: Vec<Event> = self
            .globals()
            .filter_map(|global| global.init.as_ref())
            .flat_map(|init| init.process(Event::dummy()))
            .collect();
        let scene = self.settings.initial_scene;
        let subscene = self.settings.initial_subscene;
        out.extend(self.switcher.start(scene, subscene)?);
        info!(
            name = %self.settings.name,
            scene = %self.switcher.current_name().unwrap_or_default(),
            "engine started"
        );
        Ok(self.finish(out))
    }

    /// Leaves the active scene and runs the global exit actions.
    pub fn stop(&mut self) -> Vec<Event> {
        let mut out = self.switcher.stop();
        let exits: Vec<Event> = self
            .globals()
            .filter_map(|global| global.exit.as_ref())
            .flat_map(|exit| exit.process(Event::dummy()))
            .collect();
        out.extend(exits);
        debug!("engine stopped");
        self.finish(out)
    }

    pub fn process(&mut self, event: Event) -> Vec<Event> {
        let event = event.normalized();
        let mut routed = match self.switcher.current_scene() {
            Some(scene) => {
                let pre = self.pre.as_ref().map(|global| &global.main);
                let post = self.post.as_ref().map(|global| &global.main);
                let stages = pre.into_iter().chain([&scene.main]).chain(post);
                run_stages(stages, event.clone())
            }
            None => Vec::new(),
        };
        if let Some(control) = &self.control {
            routed.extend(control.main.process(event));
        }

        let switch_types = EventType::SceneSwitch.mask() | EventType::SubSceneSwitch.mask();
        let (switches, mut out): (Vec<Event>, Vec<Event>) =
            routed.into_iter().partition(|event| event.is(switch_types));
        for switch in switches {
            let Ok(target) = switch.switch_target() else {
                continue;
            };
            let switched = match switch.kind() {
                EventType::SceneSwitch => self.switcher.switch_scene(target),
                _ => self.switcher.switch_subscene(target),
            };
            out.extend(switched);
        }
        self.finish(out)
    }

    pub fn switch_scene(&mut self, target: SwitchTarget) -> Vec<Event> {
        let out = self.switcher.switch_scene(target);
        self.finish(out)
    }

    pub fn switch_subscene(&mut self, target: SwitchTarget) -> Vec<Event> {
        let out = self.switcher.switch_subscene(target);
        self.finish(out)
    }

    /// Active scene number and subscene index.
    pub fn current(&self) -> Option<(u32, usize)> {
        self.switcher.current()
    }

    pub fn current_name(&self) -> Option<String> {
        self.switcher.current_name()
    }

    /// Drops internal events and, if enabled, sanitizes the rest.
    fn finish(&self, events: Vec<Event>) -> Vec<Event> {
        let internal = EventTypes::DUMMY
            | EventType::SceneSwitch.mask()
            | EventType::SubSceneSwitch.mask();
        let events = events.into_iter().filter(|event| !event.is(internal));
        match &self.sanitize {
            Some(sanitize) => events.flat_map(|event| sanitize.process(event)).collect(),
            None => events.collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Event(Event),
    SwitchScene(SwitchTarget),
    SwitchSubscene(SwitchTarget),
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    /// Everything one command produced. Every [`EngineCommand::Event`] gets
    /// exactly one, even when empty.
    Output(Vec<Event>),
    SceneChanged {
        scene: u32,
        subscene: usize,
        name: String,
    },
    Error {
        message: String,
    },
    Stopped,
}

/// Snapshot of the active scene, readable from any thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneStatus {
    pub scene: Option<u32>,
    pub subscene: usize,
    pub name: String,
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
    pub status: Arc<ArcSwap<SceneStatus>>,
}

impl EngineHandle {
    pub fn status(&self) -> Arc<SceneStatus> {
        self.status.load_full()
    }
}

/// Runs the engine on its own thread, fed through the returned handle. The
/// thread ends on [`EngineCommand::Stop`] or once the handle is dropped.
pub fn spawn_engine(engine: Engine) -> EngineHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();
    let status = Arc::new(ArcSwap::from_pointee(SceneStatus::default()));

    let thread_status = status.clone();
    std::thread::spawn(move || {
        engine_thread(engine, command_rx, update_tx, thread_status);
    });

    EngineHandle {
        command_tx,
        update_rx,
        status,
    }
}

struct EngineState {
    engine: Engine,
    update_tx: Sender<EngineUpdate>,
    status: Arc<ArcSwap<SceneStatus>>,
    reported: Option<(u32, usize)>,
}

impl EngineState {
    fn send_output(&self, events: Vec<Event>) {
        let _ = self.update_tx.send(EngineUpdate::Output(events));
    }

    /// Publishes the active scene if it changed since the last report.
    fn report_scene(&mut self) {
        let current = self.engine.current();
        if current == self.reported {
            return;
        }
        self.reported = current;
        let Some((scene, subscene)) = current else {
            self.status.store(Arc::new(SceneStatus::default()));
            return;
        };
        let name = self.engine.current_name().unwrap_or_default();
        self.status.store(Arc::new(SceneStatus {
            scene: Some(scene),
            subscene,
            name: name.clone(),
        }));
        let _ = self.update_tx.send(EngineUpdate::SceneChanged {
            scene,
            subscene,
            name,
        });
    }
}

fn engine_thread(
    mut engine: Engine,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
    status: Arc<ArcSwap<SceneStatus>>,
) {
    let started = engine.start();
    let mut state = EngineState {
        engine,
        update_tx,
        status,
        reported: None,
    };
    match started {
        Ok(events) => {
            if !events.is_empty() {
                state.send_output(events);
            }
            state.report_scene();
        }
        Err(e) => {
            let _ = state.update_tx.send(EngineUpdate::Error {
                message: format!("Failed to start engine: {}", e),
            });
            return;
        }
    }

    loop {
        match command_rx.recv() {
            Ok(EngineCommand::Event(event)) => {
                let out = state.engine.process(event);
                state.send_output(out);
                state.report_scene();
            }
            Ok(EngineCommand::SwitchScene(target)) => {
                let out = state.engine.switch_scene(target);
                if !out.is_empty() {
                    state.send_output(out);
                }
                state.report_scene();
            }
            Ok(EngineCommand::SwitchSubscene(target)) => {
                let out = state.engine.switch_subscene(target);
                if !out.is_empty() {
                    state.send_output(out);
                }
                state.report_scene();
            }
            Ok(EngineCommand::Stop) => {
                let out = state.engine.stop();
                if !out.is_empty() {
                    state.send_output(out);
                }
                state.report_scene();
                let _ = state.update_tx.send(EngineUpdate::Stopped);
                break;
            }
            Err(crossbeam::channel::RecvError) => break,
        }
    }
    debug!("engine thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{fork, init};
    use crate::scene::{scene_switch, scene_switch_from_program, Scene};
    use crate::units::{
        ctrl_filter, discard, port, program, program_filter, transpose, type_filter,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn setup() -> EngineSetup {
        let scenes = SceneTable::new()
            .with(1, Scene::new("up", transpose(12)).with_init(program(7)))
            .unwrap()
            .with(2, Scene::new("down", transpose(-12)))
            .unwrap();
        EngineSetup {
            scenes,
            control: Some(
                Node::from(program_filter([0, 1, 2]).unwrap()).then(scene_switch_from_program()),
            ),
            pre: Some(Node::from(type_filter(EventTypes::NOTE | EventTypes::PROGRAM))),
            post: Some(port(3)),
        }
    }

    fn engine() -> Engine {
        let mut engine = Engine::new(Settings::default(), setup()).unwrap();
        engine.start().unwrap();
        engine
    }

    #[test]
    fn start_runs_initial_scene_init() {
        let mut engine = Engine::new(Settings::default(), setup()).unwrap();
        assert_eq!(engine.start().unwrap(), vec![Event::program_change(0, 0, 7)]);
        assert_eq!(engine.current(), Some((1, 0)));
    }

    #[test]
    fn events_go_through_pre_scene_and_post() {
        let mut engine = engine();
        assert_eq!(
            engine.process(Event::note_on(0, 0, 60, 100)),
            vec![Event::note_on(3, 0, 72, 100)]
        );
        // dropped by the pre tree
        assert!(engine.process(Event::control_change(0, 0, 1, 1)).is_empty());
    }

    #[test]
    fn note_on_with_zero_velocity_is_a_note_off() {
        let mut engine = engine();
        assert_eq!(
            engine.process(Event::note_on(0, 0, 60, 0)),
            vec![Event::note_off(3, 0, 72, 0)]
        );
    }

    #[test]
    fn control_switches_after_the_event() {
        let mut engine = engine();
        let out = engine.process(Event::program_change(0, 0, 2));
        // the program change still went through scene 1 first
        assert_eq!(out, vec![Event::program_change(3, 0, 2)]);
        assert_eq!(engine.current(), Some((2, 0)));
        assert_eq!(
            engine.process(Event::note_on(0, 0, 60, 100)),
            vec![Event::note_on(3, 0, 48, 100)]
        );
    }

    #[test]
    fn switching_to_a_missing_scene_is_a_no_op() {
        let mut engine = engine();
        assert!(engine.switch_scene(SwitchTarget::Number(9)).is_empty());
        assert_eq!(engine.current(), Some((1, 0)));
    }

    #[test]
    fn negative_program_does_not_switch() {
        let scenes = SceneTable::new()
            .with(0, Scene::new("zero", port(0)))
            .unwrap()
            .with(1, Scene::new("one", port(1)))
            .unwrap();
        let setup = EngineSetup {
            scenes,
            control: Some(scene_switch_from_program()),
            ..EngineSetup::default()
        };
        let settings = Settings {
            initial_scene: Some(1),
            ..Settings::default()
        };
        let mut engine = Engine::new(settings, setup).unwrap();
        engine.start().unwrap();
        engine.process(Event::program_change(0, 0, -5));
        assert_eq!(engine.current(), Some((1, 0)));
        engine.process(Event::program_change(0, 0, 0));
        assert_eq!(engine.current(), Some((0, 0)));
    }

    #[test]
    fn sanitize_drops_out_of_range_notes() {
        let mut engine = engine();
        assert!(engine.process(Event::note_on(0, 0, 120, 100)).is_empty());

        let settings = Settings {
            sanitize: false,
            ..Settings::default()
        };
        let mut raw = Engine::new(settings, setup()).unwrap();
        raw.start().unwrap();
        assert_eq!(
            raw.process(Event::note_on(0, 0, 120, 100)),
            vec![Event::note_on(3, 0, 132, 100)]
        );
    }

    #[test]
    fn init_actions_in_scene_trees_run_on_entry() {
        let scenes = SceneTable::new()
            .with(1, Scene::new("a", discard()))
            .unwrap()
            .with(2, Scene::new("b", fork([discard(), init(program(9))])))
            .unwrap();
        let setup = EngineSetup {
            scenes,
            control: Some(Node::from(ctrl_filter([20]).unwrap()).then(scene_switch(
                SwitchTarget::Offset {
                    offset: 1,
                    wrap: true,
                },
            ))),
            ..EngineSetup::default()
        };
        let mut engine = Engine::new(Settings::default(), setup).unwrap();
        engine.start().unwrap();
        assert_eq!(
            engine.process(Event::control_change(0, 0, 20, 127)),
            vec![Event::program_change(0, 0, 9)]
        );
        assert_eq!(engine.current(), Some((2, 0)));
    }

    #[test]
    fn engine_thread_reports_outputs_and_scene_changes() {
        let handle = spawn_engine(Engine::new(Settings::default(), setup()).unwrap());
        let timeout = Duration::from_secs(5);

        assert_eq!(
            handle.update_rx.recv_timeout(timeout),
            Ok(EngineUpdate::Output(vec![Event::program_change(0, 0, 7)]))
        );
        assert_eq!(
            handle.update_rx.recv_timeout(timeout),
            Ok(EngineUpdate::SceneChanged {
                scene: 1,
                subscene: 0,
                name: "up".to_string()
            })
        );

        handle
            .command_tx
            .send(EngineCommand::SwitchScene(SwitchTarget::Number(2)))
            .unwrap();
        assert_eq!(
            handle.update_rx.recv_timeout(timeout),
            Ok(EngineUpdate::SceneChanged {
                scene: 2,
                subscene: 0,
                name: "down".to_string()
            })
        );
        assert_eq!(handle.status().scene, Some(2));

        handle
            .command_tx
            .send(EngineCommand::Event(Event::note_on(0, 0, 60, 100)))
            .unwrap();
        assert_eq!(
            handle.update_rx.recv_timeout(timeout),
            Ok(EngineUpdate::Output(vec![Event::note_on(3, 0, 48, 100)]))
        );

        handle.command_tx.send(EngineCommand::Stop).unwrap();
        assert_eq!(
            handle.update_rx.recv_timeout(timeout),
            Ok(EngineUpdate::Stopped)
        );
        assert_eq!(handle.status().scene, None);
    }
}
