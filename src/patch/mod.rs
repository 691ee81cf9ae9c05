//! Patch description and compilation.
//!
//! A patch is written as a [`Node`] tree through the builder functions in this
//! module (`chain`, `fork`, `split`, ...) and compiled once into a [`Patch`],
//! the canonical tree the engine walks for every incoming event.

mod compile;
mod selector;
mod splits;

use std::ops::Shr;
use std::sync::Arc;

use crate::events::EventTypes;
use crate::units::Unit;

pub use compile::{CompiledPatch, Patch};
pub(crate) use compile::{run_stages, Compiler};
pub use selector::Selector;
pub use splits::{
    channel_split, ctrl_split, ctrl_value_split, key_range_split, key_split, port_split,
    program_split, selector_split, velocity_range_split, velocity_split,
};

/// User-facing combinator tree. Built directly or through the helper
/// functions, which keep nested chains and forks flat.
#[derive(Debug, Clone)]
pub enum Node {
    Unit(Arc<dyn Unit>),
    /// Series composition.
    Chain(Vec<Node>),
    /// Parallel composition. `None` takes the process-wide default for
    /// duplicate removal.
    Fork {
        branches: Vec<Node>,
        remove_duplicates: Option<bool>,
    },
    /// Dispatch by event type, with an optional branch for types none of the
    /// arms name.
    Split {
        arms: Vec<(EventTypes, Node)>,
        default: Option<Box<Node>>,
    },
    /// Runs when the owning scene is entered; a discard in the main tree.
    Init(Box<Node>),
    /// Runs when the owning scene is left; a discard in the main tree.
    Exit(Box<Node>),
}

impl Node {
    pub fn unit(unit: impl Unit + 'static) -> Self {
        Node::Unit(Arc::new(unit))
    }

    pub fn then(self, next: impl Into<Node>) -> Node {
        chain([self, next.into()])
    }
}

impl<U: Unit + 'static> From<U> for Node {
    fn from(unit: U) -> Self {
        Node::unit(unit)
    }
}

impl From<Selector> for Node {
    fn from(selector: Selector) -> Self {
        selector.build()
    }
}

impl<N: Into<Node>> Shr<N> for Node {
    type Output = Node;

    fn shr(self, next: N) -> Node {
        self.then(next)
    }
}

pub fn chain(nodes: impl IntoIterator<Item = Node>) -> Node {
    let mut flat = Vec::new();
    for node in nodes {
        match node {
            Node::Chain(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        return flat.remove(0);
    }
    Node::Chain(flat)
}

fn fork_inner(nodes: impl IntoIterator<Item = Node>, remove_duplicates: Option<bool>) -> Node {
    let mut flat = Vec::new();
    for node in nodes {
        match node {
            Node::Fork {
                branches,
                remove_duplicates: inner,
            } if inner == remove_duplicates => flat.extend(branches),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        return flat.remove(0);
    }
    Node::Fork {
        branches: flat,
        remove_duplicates,
    }
}

/// Parallel composition using the process-wide duplicate-removal default.
pub fn fork(nodes: impl IntoIterator<Item = Node>) -> Node {
    fork_inner(nodes, None)
}

pub fn fork_with(nodes: impl IntoIterator<Item = Node>, remove_duplicates: bool) -> Node {
    fork_inner(nodes, Some(remove_duplicates))
}

pub fn split(arms: impl IntoIterator<Item = (EventTypes, Node)>) -> Node {
    Node::Split {
        arms: arms.into_iter().collect(),
        default: None,
    }
}

pub fn split_or(arms: impl IntoIterator<Item = (EventTypes, Node)>, default: Node) -> Node {
    Node::Split {
        arms: arms.into_iter().collect(),
        default: Some(Box::new(default)),
    }
}

pub fn init(node: impl Into<Node>) -> Node {
    Node::Init(Box::new(node.into()))
}

pub fn exit(node: impl Into<Node>) -> Node {
    Node::Exit(Box::new(node.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{pass, transpose};

    #[test]
    fn chain_helper_flattens() {
        let a = transpose(1);
        let b = transpose(2);
        let c = transpose(3);
        let nested = chain([chain([a.clone(), b.clone()]), c.clone()]);
        let Node::Chain(items) = nested else {
            panic!("expected a chain");
        };
        assert_eq!(items.len(), 3);

        let infix = a >> b >> c;
        assert!(matches!(infix, Node::Chain(ref items) if items.len() == 3));
    }

    #[test]
    fn fork_helper_flattens_only_matching_forks() {
        let same = fork([fork([pass(), pass()]), pass()]);
        assert!(matches!(same, Node::Fork { ref branches, .. } if branches.len() == 3));

        let mixed = fork([fork_with([pass(), pass()], false), pass()]);
        assert!(matches!(mixed, Node::Fork { ref branches, .. } if branches.len() == 2));
    }

    #[test]
    fn single_child_wrappers_disappear() {
        assert!(matches!(chain([pass()]), Node::Unit(_)));
        assert!(matches!(fork([pass()]), Node::Unit(_)));
    }
}
