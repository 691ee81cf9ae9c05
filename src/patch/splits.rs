use super::{fork, Node, Selector};
use crate::error::PatchError;
use crate::events::EventTypes;
use crate::units::{
    channel_filter, ctrl_filter, ctrl_value_filter, key_filter, port_filter, program_filter,
    type_filter, velocity_filter, Filter,
};

/// Lowers a [`Node::Split`] into a fork of type-filtered branches. The
/// default branch only sees events none of the arm masks cover.
pub(crate) fn lower_type_split(
    arms: &[(EventTypes, Node)],
    default: Option<&Node>,
) -> Result<Node, PatchError> {
    let mut branches = Vec::with_capacity(arms.len() + 1);
    let mut guards = Vec::with_capacity(arms.len());
    for (types, node) in arms {
        if types.is_empty() {
            return Err(PatchError::EmptyTypeMask);
        }
        let filter = type_filter(*types);
        branches.push(Node::unit(filter.clone()).then(node.clone()));
        guards.push(Selector::Filter(filter.negate()));
    }
    if let Some(default) = default {
        branches.push(Selector::And(guards).apply(default.clone()));
    }
    Ok(fork(branches))
}

/// Routes events matching each selector through its branch, and events
/// matching none of them through `default` if given.
pub fn selector_split(
    arms: impl IntoIterator<Item = (Selector, Node)>,
    default: Option<Node>,
) -> Result<Node, PatchError> {
    let arms: Vec<_> = arms.into_iter().collect();
    if arms.is_empty() {
        return Err(PatchError::EmptyList("split"));
    }
    let mut guards = Vec::with_capacity(arms.len());
    let mut branches = Vec::with_capacity(arms.len() + 1);
    for (selector, node) in arms {
        branches.push(selector.apply(node));
        guards.push(selector.negate());
    }
    if let Some(default) = default {
        branches.push(Selector::And(guards).apply(default));
    }
    Ok(fork(branches))
}

fn filter_split<K>(
    arms: impl IntoIterator<Item = (K, Node)>,
    default: Option<Node>,
    make: impl Fn(K) -> Result<Filter, PatchError>,
) -> Result<Node, PatchError> {
    let arms = arms
        .into_iter()
        .map(|(key, node)| Ok((Selector::Filter(make(key)?), node)))
        .collect::<Result<Vec<_>, PatchError>>()?;
    selector_split(arms, default)
}

/// Two-way split on a filter and its inverse: `lower` gets what `filter`
/// matches, `upper` the rest of the filter's own types. Events of other types
/// follow the filter's pass-other verdict on both sides.
fn threshold_split(filter: Filter, lower: Node, upper: Node) -> Node {
    fork([
        Node::unit(filter.clone()).then(lower),
        Node::unit(filter.invert()).then(upper),
    ])
}

/// Notes below `threshold` go to `lower`, the others to `upper`.
pub fn key_split(threshold: i32, lower: Node, upper: Node) -> Result<Node, PatchError> {
    Ok(threshold_split(key_filter(0, threshold)?, lower, upper))
}

/// Note-ons with velocity below `threshold` go to `lower`, the others to
/// `upper`.
pub fn velocity_split(threshold: i32, lower: Node, upper: Node) -> Result<Node, PatchError> {
    Ok(threshold_split(velocity_filter(0, threshold)?, lower, upper))
}

/// Controller values below `threshold` go to `lower`, the others to `upper`.
pub fn ctrl_value_split(threshold: i32, lower: Node, upper: Node) -> Result<Node, PatchError> {
    Ok(threshold_split(ctrl_value_filter(0, threshold)?, lower, upper))
}

pub fn port_split<P>(
    arms: impl IntoIterator<Item = (P, Node)>,
    default: Option<Node>,
) -> Result<Node, PatchError>
where
    P: IntoIterator<Item = u16>,
{
    filter_split(arms, default, port_filter)
}

pub fn channel_split<C>(
    arms: impl IntoIterator<Item = (C, Node)>,
    default: Option<Node>,
) -> Result<Node, PatchError>
where
    C: IntoIterator<Item = u8>,
{
    filter_split(arms, default, channel_filter)
}

pub fn ctrl_split<C>(
    arms: impl IntoIterator<Item = (C, Node)>,
    default: Option<Node>,
) -> Result<Node, PatchError>
where
    C: IntoIterator<Item = i32>,
{
    filter_split(arms, default, ctrl_filter)
}

pub fn program_split<P>(
    arms: impl IntoIterator<Item = (P, Node)>,
    default: Option<Node>,
) -> Result<Node, PatchError>
where
    P: IntoIterator<Item = i32>,
{
    filter_split(arms, default, program_filter)
}

/// Each arm takes notes in its `[lo, hi)` range. Non-note events reach every
/// arm and never the default.
pub fn key_range_split(
    arms: impl IntoIterator<Item = ((i32, i32), Node)>,
    default: Option<Node>,
) -> Result<Node, PatchError> {
    filter_split(arms, default, |(lo, hi)| key_filter(lo, hi))
}

pub fn velocity_range_split(
    arms: impl IntoIterator<Item = ((i32, i32), Node)>,
    default: Option<Node>,
) -> Result<Node, PatchError> {
    filter_split(arms, default, |(lo, hi)| velocity_filter(lo, hi))
}
