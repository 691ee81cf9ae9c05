use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::{Scene, SceneEntry, SceneTable};
use crate::error::PatchError;
use crate::events::{Event, SwitchTarget};
use crate::patch::{Compiler, Patch};
use crate::settings::Settings;

/// A scene ready to run: its main tree plus the init and exit trees gathered
/// from its declaration and from actions inside the main tree.
#[derive(Debug, Clone)]
pub struct CompiledScene {
    pub name: String,
    pub main: Patch,
    pub init: Option<Patch>,
    pub exit: Option<Patch>,
}

impl CompiledScene {
    fn compile(scene: &Scene, settings: &Settings) -> Result<Self, PatchError> {
        let mut compiler = Compiler::new(settings);
        let main = compiler.main(&scene.patch)?;
        if let Some(init) = &scene.init {
            compiler.init_action(init)?;
        }
        if let Some(exit) = &scene.exit {
            compiler.exit_action(exit)?;
        }
        let (init, exit) = compiler.finish();
        Ok(Self {
            name: scene.name.clone(),
            main,
            init,
            exit,
        })
    }
}

#[derive(Debug)]
struct CompiledEntry {
    name: String,
    /// A plain scene is a group of one.
    subscenes: Vec<CompiledScene>,
}

/// Owns the compiled scenes and the active scene/subscene. Every switch runs
/// the outgoing exit tree, then the incoming init tree.
#[derive(Debug)]
pub struct SceneSwitcher {
    scenes: BTreeMap<u32, CompiledEntry>,
    current: Option<(u32, usize)>,
}

fn run_action(action: Option<&Patch>) -> Vec<Event> {
    action.map_or_else(Vec::new, |patch| patch.process(Event::dummy()))
}

/// Resolves a switch target against an ordered list of candidates.
fn resolve<T: Copy + PartialEq>(
    candidates: &[T],
    current: T,
    offset: i32,
    wrap: bool,
) -> Option<T> {
    let pos = candidates.iter().position(|c| *c == current)? as i64;
    let len = candidates.len() as i64;
    let next = pos + i64::from(offset);
    let index = if wrap {
        next.rem_euclid(len)
    } else if (0..len).contains(&next) {
        next
    } else {
        return None;
    };
    Some(candidates[index as usize])
}

impl SceneSwitcher {
    pub fn compile(table: &SceneTable, settings: &Settings) -> Result<Self, PatchError> {
        if table.is_empty() {
            return Err(PatchError::EmptyList("scene table"));
        }
        let mut scenes = BTreeMap::new();
        for (number, entry) in table.iter() {
            let compiled = match entry {
                SceneEntry::Single(scene) => CompiledEntry {
                    name: scene.name.clone(),
                    subscenes: vec![CompiledScene::compile(scene, settings)?],
                },
                SceneEntry::Group(group) => CompiledEntry {
                    name: group.name.clone(),
                    subscenes: group
                        .subscenes
                        .iter()
                        .map(|scene| CompiledScene::compile(scene, settings))
                        .collect::<Result<_, _>>()?,
                },
            };
            scenes.insert(number, compiled);
        }
        Ok(Self {
            scenes,
            current: None,
        })
    }

    /// Active scene number and subscene index.
    pub fn current(&self) -> Option<(u32, usize)> {
        self.current
    }

    pub fn current_scene(&self) -> Option<&CompiledScene> {
        let (number, subscene) = self.current?;
        self.scenes.get(&number)?.subscenes.get(subscene)
    }

    /// Display name of the active scene, with the subscene for groups.
    pub fn current_name(&self) -> Option<String> {
        let (number, subscene) = self.current?;
        let entry = self.scenes.get(&number)?;
        let scene = entry.subscenes.get(subscene)?;
        if entry.subscenes.len() > 1 || entry.name != scene.name {
            Some(format!("{} / {}", entry.name, scene.name))
        } else {
            Some(scene.name.clone())
        }
    }

    /// Enters the initial scene: the requested one, or the lowest-numbered.
    pub fn start(
        &mut self,
        scene: Option<u32>,
        subscene: Option<usize>,
    ) -> Result<Vec<Event>, PatchError> {
        let number = match scene {
            Some(number) => number,
            None => *self
                .scenes
                .keys()
                .next()
                .ok_or(PatchError::EmptyList("scene table"))?,
        };
        let entry = self
            .scenes
            .get(&number)
            .ok_or(PatchError::UnknownScene(number))?;
        let subscene = subscene.unwrap_or(0);
        if subscene >= entry.subscenes.len() {
            return Err(PatchError::OutOfRange {
                what: "initial subscene",
                value: subscene as i32,
            });
        }
        self.current = None;
        Ok(self.enter(number, subscene))
    }

    /// Leaves the active scene, running its exit tree.
    pub fn stop(&mut self) -> Vec<Event> {
        let out = run_action(self.current_scene().and_then(|s| s.exit.as_ref()));
        self.current = None;
        out
    }

    pub fn switch_scene(&mut self, target: SwitchTarget) -> Vec<Event> {
        let number = match target {
            SwitchTarget::Number(number) => number,
            SwitchTarget::Offset { offset, wrap } => {
                let numbers: Vec<u32> = self.scenes.keys().copied().collect();
                let Some((current, _)) = self.current else {
                    warn!(?target, "relative scene switch before any scene is active");
                    return Vec::new();
                };
                match resolve(&numbers, current, offset, wrap) {
                    Some(number) => number,
                    None => {
                        warn!(?target, current, "relative scene switch out of range");
                        return Vec::new();
                    }
                }
            }
        };
        if !self.scenes.contains_key(&number) {
            warn!(scene = number, "switch to nonexistent scene ignored");
            return Vec::new();
        }
        // re-selecting the active scene goes back to its first subscene
        if self.current == Some((number, 0)) {
            return Vec::new();
        }
        self.enter(number, 0)
    }

    pub fn switch_subscene(&mut self, target: SwitchTarget) -> Vec<Event> {
        let Some((number, current)) = self.current else {
            warn!(?target, "subscene switch before any scene is active");
            return Vec::new();
        };
        let count = self
            .scenes
            .get(&number)
            .map_or(0, |entry| entry.subscenes.len());
        let index = match target {
            SwitchTarget::Number(index) => index as usize,
            SwitchTarget::Offset { offset, wrap } => {
                let indices: Vec<usize> = (0..count).collect();
                match resolve(&indices, current, offset, wrap) {
                    Some(index) => index,
                    None => {
                        warn!(
                            ?target,
                            scene = number,
                            current,
                            "relative subscene switch out of range"
                        );
                        return Vec::new();
                    }
                }
            }
        };
        if index >= count {
            warn!(
                scene = number,
                subscene = index,
                "switch to nonexistent subscene ignored"
            );
            return Vec::new();
        }
        if index == current {
            return Vec::new();
        }
        self.enter(number, index)
    }

    /// Routes one event through the active scene's main tree. Nothing comes
    /// out before a scene is active.
    pub fn process(&self, event: Event) -> Vec<Event> {
        match self.current_scene() {
            Some(scene) => scene.main.process(event),
            None => Vec::new(),
        }
    }

    fn enter(&mut self, number: u32, subscene: usize) -> Vec<Event> {
        let mut out = run_action(self.current_scene().and_then(|s| s.exit.as_ref()));
        self.current = Some((number, subscene));
        out.extend(run_action(self.current_scene().and_then(|s| s.init.as_ref())));
        debug!(
            scene = number,
            subscene,
            name = %self.current_name().unwrap_or_default(),
            "switched scene"
        );
        out
    }
}
