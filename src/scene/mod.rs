//! Scenes: numbered patches the engine switches between at runtime.

mod actions;
mod switcher;

use std::collections::BTreeMap;

use crate::error::PatchError;
use crate::patch::Node;

pub use actions::{scene_switch, scene_switch_from_program, subscene_switch, SwitchUnit};
pub use switcher::{CompiledScene, SceneSwitcher};

#[derive(Debug, Clone)]
pub struct Scene {
    pub name: String,
    pub patch: Node,
    /// Runs when the scene is entered.
    pub init: Option<Node>,
    /// Runs when the scene is left.
    pub exit: Option<Node>,
}

impl Scene {
    pub fn new(name: impl Into<String>, patch: impl Into<Node>) -> Self {
        Self {
            name: name.into(),
            patch: patch.into(),
            init: None,
            exit: None,
        }
    }

    pub fn with_init(mut self, init: impl Into<Node>) -> Self {
        self.init = Some(init.into());
        self
    }

    pub fn with_exit(mut self, exit: impl Into<Node>) -> Self {
        self.exit = Some(exit.into());
        self
    }
}

/// Subscenes sharing one scene number, switched between by index.
#[derive(Debug, Clone)]
pub struct SceneGroup {
    pub name: String,
    pub subscenes: Vec<Scene>,
}

impl SceneGroup {
    pub fn new(name: impl Into<String>, subscenes: impl IntoIterator<Item = Scene>) -> Self {
        Self {
            name: name.into(),
            subscenes: subscenes.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SceneEntry {
    Single(Scene),
    Group(SceneGroup),
}

impl From<Scene> for SceneEntry {
    fn from(scene: Scene) -> Self {
        SceneEntry::Single(scene)
    }
}

impl From<SceneGroup> for SceneEntry {
    fn from(group: SceneGroup) -> Self {
        SceneEntry::Group(group)
    }
}

/// Scene declarations by number.
#[derive(Debug, Clone, Default)]
pub struct SceneTable {
    entries: BTreeMap<u32, SceneEntry>,
}

impl SceneTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, number: u32, entry: impl Into<SceneEntry>) -> Result<(), PatchError> {
        let entry = entry.into();
        if let SceneEntry::Group(group) = &entry {
            if group.subscenes.is_empty() {
                return Err(PatchError::EmptySceneGroup(number));
            }
        }
        if self.entries.contains_key(&number) {
            return Err(PatchError::DuplicateScene(number));
        }
        self.entries.insert(number, entry);
        Ok(())
    }

    pub fn with(mut self, number: u32, entry: impl Into<SceneEntry>) -> Result<Self, PatchError> {
        self.insert(number, entry)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u32, &SceneEntry)> {
        self.entries.iter().map(|(number, entry)| (*number, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::pass;

    #[test]
    fn duplicate_numbers_are_rejected() {
        let mut table = SceneTable::new();
        table.insert(1, Scene::new("one", pass())).unwrap();
        assert_eq!(
            table.insert(1, Scene::new("again", pass())),
            Err(PatchError::DuplicateScene(1))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_groups_are_rejected() {
        let result = SceneTable::new().with(3, SceneGroup::new("empty", []));
        assert_eq!(result.unwrap_err(), PatchError::EmptySceneGroup(3));
    }
}
