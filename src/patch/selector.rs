use std::ops::{BitAnd, BitOr, Neg, Not};

use super::{chain, fork, fork_with, Node};
use crate::events::Event;
use crate::units::Filter;

/// Boolean algebra over filters.
///
/// Every selector compiles two ways: [`Selector::build`] passes the events it
/// matches, [`Selector::build_negated`] passes the others. Conjunctions build
/// as chains and their negation as a de-duplicating fork (De Morgan);
/// disjunctions the other way round.
#[derive(Debug, Clone)]
pub enum Selector {
    Filter(Filter),
    And(Vec<Selector>),
    Or(Vec<Selector>),
}

impl Selector {
    pub fn and(self, other: impl Into<Selector>) -> Selector {
        let mut terms = match self {
            Selector::And(terms) => terms,
            single => vec![single],
        };
        match other.into() {
            Selector::And(more) => terms.extend(more),
            single => terms.push(single),
        }
        Selector::And(terms)
    }

    pub fn or(self, other: impl Into<Selector>) -> Selector {
        let mut terms = match self {
            Selector::Or(terms) => terms,
            single => vec![single],
        };
        match other.into() {
            Selector::Or(more) => terms.extend(more),
            single => terms.push(single),
        }
        Selector::Or(terms)
    }

    /// Type-preserving inversion, see [`Filter::invert`]. Compound selectors
    /// distribute it over their terms.
    pub fn invert(self) -> Selector {
        match self {
            Selector::Filter(filter) => Selector::Filter(filter.invert()),
            Selector::And(terms) => Selector::Or(terms.into_iter().map(Selector::invert).collect()),
            Selector::Or(terms) => Selector::And(terms.into_iter().map(Selector::invert).collect()),
        }
    }

    /// Complement over all event types.
    pub fn negate(self) -> Selector {
        match self {
            Selector::Filter(filter) => Selector::Filter(filter.negate()),
            Selector::And(terms) => Selector::Or(terms.into_iter().map(Selector::negate).collect()),
            Selector::Or(terms) => Selector::And(terms.into_iter().map(Selector::negate).collect()),
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Selector::Filter(filter) => filter.matches(event),
            Selector::And(terms) => terms.iter().all(|term| term.matches(event)),
            Selector::Or(terms) => terms.iter().any(|term| term.matches(event)),
        }
    }

    pub fn build(&self) -> Node {
        match self {
            Selector::Filter(filter) => Node::unit(filter.clone()),
            Selector::And(terms) => chain(terms.iter().map(Selector::build)),
            Selector::Or(terms) => fork_with(terms.iter().map(Selector::build), true),
        }
    }

    pub fn build_negated(&self) -> Node {
        match self {
            Selector::Filter(filter) => Node::unit(filter.clone().negate()),
            Selector::And(terms) => fork_with(terms.iter().map(Selector::build_negated), true),
            Selector::Or(terms) => chain(terms.iter().map(Selector::build_negated)),
        }
    }

    /// Matching events go through `then`; the rest are discarded.
    pub fn apply(&self, then: impl Into<Node>) -> Node {
        chain([self.build(), then.into()])
    }

    /// Matching events go through `then`, the rest through `otherwise`.
    pub fn apply_else(&self, then: impl Into<Node>, otherwise: impl Into<Node>) -> Node {
        fork([
            chain([self.build(), then.into()]),
            chain([self.build_negated(), otherwise.into()]),
        ])
    }
}

impl From<Filter> for Selector {
    fn from(filter: Filter) -> Self {
        Selector::Filter(filter)
    }
}

impl<S: Into<Selector>> BitAnd<S> for Selector {
    type Output = Selector;

    fn bitand(self, rhs: S) -> Selector {
        self.and(rhs)
    }
}

impl<S: Into<Selector>> BitOr<S> for Selector {
    type Output = Selector;

    fn bitor(self, rhs: S) -> Selector {
        self.or(rhs)
    }
}

impl<S: Into<Selector>> BitAnd<S> for Filter {
    type Output = Selector;

    fn bitand(self, rhs: S) -> Selector {
        Selector::from(self).and(rhs)
    }
}

impl<S: Into<Selector>> BitOr<S> for Filter {
    type Output = Selector;

    fn bitor(self, rhs: S) -> Selector {
        Selector::from(self).or(rhs)
    }
}

impl Not for Selector {
    type Output = Selector;

    fn not(self) -> Selector {
        self.invert()
    }
}

impl Neg for Selector {
    type Output = Selector;

    fn neg(self) -> Selector {
        self.negate()
    }
}
