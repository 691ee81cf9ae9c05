use std::fmt;
use std::sync::Arc;

use super::{splits, Node};
use crate::error::PatchError;
use crate::events::Event;
use crate::settings::Settings;
use crate::units::{Discard, Pass, Unit};

/// Canonical executable tree: no splits, no init/exit markers, no nested
/// same-kind nodes and no single-child wrappers.
#[derive(Clone)]
pub enum Patch {
    Unit(Arc<dyn Unit>),
    Chain(Vec<Patch>),
    Fork {
        branches: Vec<Patch>,
        remove_duplicates: bool,
    },
}

/// A compiled main tree together with the init and exit actions collected
/// from it.
#[derive(Debug, Clone)]
pub struct CompiledPatch {
    pub main: Patch,
    pub init: Option<Patch>,
    pub exit: Option<Patch>,
}

impl Patch {
    pub fn compile(node: &Node, settings: &Settings) -> Result<CompiledPatch, PatchError> {
        let mut compiler = Compiler::new(settings);
        let main = compiler.main(node)?;
        let (init, exit) = compiler.finish();
        Ok(CompiledPatch { main, init, exit })
    }

    fn chain(mut items: Vec<Patch>) -> Patch {
        match items.len() {
            0 => Patch::Unit(Arc::new(Pass)),
            1 => items.remove(0),
            _ => Patch::Chain(items),
        }
    }

    fn fork(mut branches: Vec<Patch>, remove_duplicates: bool) -> Patch {
        match branches.len() {
            0 => Patch::Unit(Arc::new(Discard)),
            1 => branches.remove(0),
            _ => Patch::Fork {
                branches,
                remove_duplicates,
            },
        }
    }

    /// Runs one event through the tree.
    pub fn process(&self, event: Event) -> Vec<Event> {
        match self {
            Patch::Unit(unit) => unit.process(event),
            Patch::Chain(items) => run_stages(items, event),
            Patch::Fork {
                branches,
                remove_duplicates,
            } => {
                let mut out: Vec<Event> = Vec::new();
                for branch in branches {
                    for result in branch.process(event.clone()) {
                        if !*remove_duplicates || !out.contains(&result) {
                            out.push(result);
                        }
                    }
                }
                out
            }
        }
    }
}

/// Feeds every output of one stage into the next, stopping as soon as a stage
/// produces nothing.
pub(crate) fn run_stages<'a>(
    stages: impl IntoIterator<Item = &'a Patch>,
    event: Event,
) -> Vec<Event> {
    let mut events = vec![event];
    for stage in stages {
        events = events
            .into_iter()
            .flat_map(|event| stage.process(event))
            .collect();
        if events.is_empty() {
            break;
        }
    }
    events
}

impl PartialEq for Patch {
    /// Structural equality; units compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Patch::Unit(a), Patch::Unit(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Patch::Chain(a), Patch::Chain(b)) => a == b,
            (
                Patch::Fork {
                    branches: a,
                    remove_duplicates: da,
                },
                Patch::Fork {
                    branches: b,
                    remove_duplicates: db,
                },
            ) => da == db && a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Unit(unit) => fmt::Debug::fmt(&**unit, f),
            Patch::Chain(items) => f.debug_tuple("Chain").field(items).finish(),
            Patch::Fork {
                branches,
                remove_duplicates,
            } => f
                .debug_struct("Fork")
                .field("branches", branches)
                .field("remove_duplicates", remove_duplicates)
                .finish(),
        }
    }
}

/// Lowers [`Node`] trees into [`Patch`]es, collecting init/exit actions along
/// the way. One compiler instance serves one scene.
pub(crate) struct Compiler {
    remove_duplicates: bool,
    init: Vec<Patch>,
    exit: Vec<Patch>,
    in_action: bool,
}

impl Compiler {
    pub(crate) fn new(settings: &Settings) -> Self {
        Self {
            remove_duplicates: settings.remove_duplicates,
            init: Vec::new(),
            exit: Vec::new(),
            in_action: false,
        }
    }

    pub(crate) fn main(&mut self, node: &Node) -> Result<Patch, PatchError> {
        self.lower(node)
    }

    pub(crate) fn init_action(&mut self, node: &Node) -> Result<(), PatchError> {
        let patch = self.action(node)?;
        self.init.push(patch);
        Ok(())
    }

    pub(crate) fn exit_action(&mut self, node: &Node) -> Result<(), PatchError> {
        let patch = self.action(node)?;
        self.exit.push(patch);
        Ok(())
    }

    pub(crate) fn finish(self) -> (Option<Patch>, Option<Patch>) {
        let dedup = self.remove_duplicates;
        let collect = |actions: Vec<Patch>| {
            (!actions.is_empty()).then(|| Patch::fork(actions, dedup))
        };
        (collect(self.init), collect(self.exit))
    }

    fn action(&mut self, node: &Node) -> Result<Patch, PatchError> {
        if self.in_action {
            return Err(PatchError::NestedAction(format!("{node:?}")));
        }
        self.in_action = true;
        let patch = self.lower(node);
        self.in_action = false;
        patch
    }

    fn lower(&mut self, node: &Node) -> Result<Patch, PatchError> {
        match node {
            Node::Unit(unit) => Ok(Patch::Unit(Arc::clone(unit))),
            Node::Chain(items) => {
                let mut flat = Vec::with_capacity(items.len());
                for item in items {
                    match self.lower(item)? {
                        Patch::Chain(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                Ok(Patch::chain(flat))
            }
            Node::Fork {
                branches,
                remove_duplicates,
            } => {
                let dedup = remove_duplicates.unwrap_or(self.remove_duplicates);
                let mut flat = Vec::with_capacity(branches.len());
                for branch in branches {
                    match self.lower(branch)? {
                        Patch::Fork {
                            branches,
                            remove_duplicates,
                        } if remove_duplicates == dedup => flat.extend(branches),
                        other => flat.push(other),
                    }
                }
                Ok(Patch::fork(flat, dedup))
            }
            Node::Split { arms, default } => {
                let lowered = splits::lower_type_split(arms, default.as_deref())?;
                self.lower(&lowered)
            }
            Node::Init(inner) => {
                let patch = self.action(inner)?;
                self.init.push(patch);
                Ok(Patch::Unit(Arc::new(Discard)))
            }
            Node::Exit(inner) => {
                let patch = self.action(inner)?;
                self.exit.push(patch);
                Ok(Patch::Unit(Arc::new(Discard)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTypes;
    use crate::patch::{chain, exit, fork, fork_with, init, split, split_or};
    use crate::units::{discard, pass, program, transpose};
    use pretty_assertions::assert_eq;

    fn compile(node: &Node) -> Patch {
        Patch::compile(node, &Settings::default()).unwrap().main
    }

    #[test]
    fn nested_chains_compile_flat() {
        let (a, b, c) = (transpose(1), transpose(2), transpose(3));
        let nested = Node::Chain(vec![Node::Chain(vec![a.clone(), b.clone()]), c.clone()]);
        let flat = Node::Chain(vec![a, b, c]);
        assert_eq!(compile(&nested), compile(&flat));
        assert!(matches!(compile(&flat), Patch::Chain(ref items) if items.len() == 3));
    }

    #[test]
    fn nested_forks_compile_flat() {
        let (a, b, c) = (transpose(1), transpose(2), transpose(3));
        let nested = Node::Fork {
            branches: vec![
                Node::Fork {
                    branches: vec![a.clone(), b.clone()],
                    remove_duplicates: None,
                },
                c.clone(),
            ],
            remove_duplicates: None,
        };
        assert_eq!(compile(&nested), compile(&fork([a, b, c])));
    }

    #[test]
    fn single_child_wrappers_collapse() {
        let a = transpose(1);
        let wrapped = Node::Chain(vec![Node::Fork {
            branches: vec![a.clone()],
            remove_duplicates: None,
        }]);
        assert_eq!(compile(&wrapped), compile(&a));
    }

    #[test]
    fn chain_runs_in_order_on_every_output() {
        let patch = compile(&chain([
            fork_with([pass(), transpose(12)], false),
            transpose(1),
        ]));
        assert_eq!(
            patch.process(Event::note_on(0, 0, 60, 100)),
            vec![Event::note_on(0, 0, 61, 100), Event::note_on(0, 0, 73, 100)]
        );
    }

    #[test]
    fn chain_stops_once_empty() {
        let (seen_tx, seen_rx) = crossbeam::channel::unbounded();
        let patch = compile(&chain([discard(), crate::units::call(seen_tx)]));
        assert!(patch.process(Event::note_on(0, 0, 60, 100)).is_empty());
        assert!(seen_rx.try_recv().is_err());
    }

    #[test]
    fn fork_preserves_branch_order() {
        let branches = vec![transpose(3), pass(), transpose(-3), pass()];
        let patch = compile(&fork_with(branches.clone(), false));
        let input = Event::note_on(0, 0, 60, 100);

        let expected: Vec<Event> = branches
            .iter()
            .flat_map(|branch| compile(branch).process(input.clone()))
            .collect();
        assert_eq!(patch.process(input), expected);
    }

    #[test]
    fn fork_removes_duplicates_when_asked() {
        let input = Event::note_on(0, 0, 60, 100);
        let dedup = compile(&fork_with([pass(), transpose(1), pass()], true));
        assert_eq!(
            dedup.process(input.clone()),
            vec![input.clone(), Event::note_on(0, 0, 61, 100)]
        );

        let settings = Settings {
            remove_duplicates: false,
            ..Settings::default()
        };
        let keep = Patch::compile(&fork([pass(), pass()]), &settings).unwrap().main;
        assert_eq!(keep.process(input.clone()), vec![input.clone(), input]);
    }

    #[test]
    fn split_routes_by_type_with_default() {
        let node = split_or(
            [
                (EventTypes::NOTE, transpose(12)),
                (EventTypes::PROGRAM, discard()),
            ],
            crate::units::port(7),
        );
        let patch = compile(&node);
        assert_eq!(
            patch.process(Event::note_on(0, 0, 60, 100)),
            vec![Event::note_on(0, 0, 72, 100)]
        );
        assert!(patch.process(Event::program_change(0, 0, 1)).is_empty());
        assert_eq!(
            patch.process(Event::control_change(0, 0, 1, 1)),
            vec![Event::control_change(7, 0, 1, 1)]
        );
    }

    #[test]
    fn split_without_default_drops_unmatched() {
        let patch = compile(&split([(EventTypes::CTRL, pass())]));
        assert!(patch.process(Event::note_on(0, 0, 60, 100)).is_empty());
    }

    #[test]
    fn split_rejects_empty_masks() {
        let node = split([(EventTypes::NONE, pass())]);
        assert_eq!(
            Patch::compile(&node, &Settings::default()).unwrap_err(),
            PatchError::EmptyTypeMask
        );
    }

    #[test]
    fn init_and_exit_are_collected() {
        let node = fork([pass(), init(program(5)), exit(program(6))]);
        let compiled = Patch::compile(&node, &Settings::default()).unwrap();

        let input = Event::note_on(0, 0, 60, 100);
        assert_eq!(compiled.main.process(input.clone()), vec![input]);
        assert_eq!(
            compiled.init.unwrap().process(Event::dummy()),
            vec![Event::program_change(0, 0, 5)]
        );
        assert_eq!(
            compiled.exit.unwrap().process(Event::dummy()),
            vec![Event::program_change(0, 0, 6)]
        );
    }

    #[test]
    fn nested_actions_are_rejected() {
        let node = init(exit(pass()));
        assert!(matches!(
            Patch::compile(&node, &Settings::default()),
            Err(PatchError::NestedAction(_))
        ));
    }
}
