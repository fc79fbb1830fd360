//! Selector chain executor
//!
//! [`Selector::select`] walks a compiled chain for one candidate value,
//! emitting `(path, value)` pairs into a [`NodeAccumulator`]. Each stage
//! either emits directly (terminal stage), recurses into its tail with a
//! lengthened path, or both. Post-pass ordering and de-duplication per the
//! result options happen in [`sort_and_dedup`], shared between the public
//! entry points and the expression VM's mid-program selector tokens.

use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;

use crate::ast::Selector;
use crate::expression::{NodeKind, ValueRef};
use crate::normalized_paths::{NormalizedPath, PathNode};
use crate::options::ResultOptions;
use crate::resources::DynamicResources;
use crate::tokens::is_truthy;

/// Consumer of selector emissions.
pub(crate) trait NodeAccumulator<'a> {
    fn accumulate(&mut self, stem: &Rc<PathNode>, value: ValueRef<'a>);
}

/// A materialized emission: flattened path plus value alias.
#[derive(Debug)]
pub(crate) struct PathValueNode<'a> {
    pub(crate) path: NormalizedPath,
    pub(crate) value: ValueRef<'a>,
}

/// Materializing accumulator; flattens each stem into a [`NormalizedPath`]
/// on arrival.
#[derive(Debug, Default)]
pub(crate) struct NodeBuffer<'a> {
    nodes: Vec<PathValueNode<'a>>,
}

impl<'a> NodeBuffer<'a> {
    pub(crate) fn into_nodes(self) -> Vec<PathValueNode<'a>> {
        self.nodes
    }
}

impl<'a> NodeAccumulator<'a> for NodeBuffer<'a> {
    fn accumulate(&mut self, stem: &Rc<PathNode>, value: ValueRef<'a>) {
        self.nodes.push(PathValueNode {
            path: NormalizedPath::from_node(stem),
            value,
        });
    }
}

/// Buffering accumulator that keeps the unflattened stem, for the subquery
/// cache and for staging union branches.
#[derive(Debug, Default)]
pub(crate) struct StemBuffer<'a> {
    pub(crate) nodes: Vec<(Rc<PathNode>, ValueRef<'a>)>,
}

impl<'a> NodeAccumulator<'a> for StemBuffer<'a> {
    fn accumulate(&mut self, stem: &Rc<PathNode>, value: ValueRef<'a>) {
        self.nodes.push((Rc::clone(stem), value));
    }
}

/// Streaming accumulator that hands each emission straight to a caller
/// callback.
pub(crate) struct CallbackAccumulator<'c> {
    pub(crate) callback: &'c mut dyn FnMut(&NormalizedPath, &Value),
}

impl<'a, 'c> NodeAccumulator<'a> for CallbackAccumulator<'c> {
    fn accumulate(&mut self, stem: &Rc<PathNode>, value: ValueRef<'a>) {
        let path = NormalizedPath::from_node(stem);
        (self.callback)(&path, value.get());
    }
}

/// Path extension honouring the path-required bit: when no caller asked for
/// paths, ordering, or de-duplication, the stem is reused unchanged.
fn extend_with_member(
    stem: &Rc<PathNode>,
    name: &str,
    options: ResultOptions,
) -> Rc<PathNode> {
    if options.path_required() {
        PathNode::member(stem, name)
    } else {
        Rc::clone(stem)
    }
}

fn extend_with_index(stem: &Rc<PathNode>, index: usize, options: ResultOptions) -> Rc<PathNode> {
    if options.path_required() {
        PathNode::index(stem, index)
    } else {
        Rc::clone(stem)
    }
}

/// Applies the `SORT` and `NODUPS` post-passes. With both, duplicates are
/// dropped after sorting; with `NODUPS` alone, the first occurrence of each
/// path survives in emission order.
pub(crate) fn sort_and_dedup(nodes: &mut Vec<PathValueNode<'_>>, options: ResultOptions) {
    if nodes.len() <= 1 {
        return;
    }
    if options.sort() {
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
    }
    if options.nodups() {
        if options.sort() {
            nodes.dedup_by(|a, b| a.path == b.path);
        } else {
            let mut seen = HashSet::new();
            nodes.retain(|node| seen.insert(node.path.clone()));
        }
    }
}

impl Selector {
    /// Emits into the accumulator if this stage is terminal, otherwise
    /// forwards to the tail stage.
    fn evaluate_tail<'a>(
        &'a self,
        resources: &mut DynamicResources<'a>,
        root: &'a Value,
        stem: &Rc<PathNode>,
        current: ValueRef<'a>,
        accumulator: &mut dyn NodeAccumulator<'a>,
        node_kind: &mut NodeKind,
        options: ResultOptions,
    ) {
        match self.tail() {
            None => accumulator.accumulate(stem, current),
            Some(tail) => {
                tail.select(resources, root, stem, current, accumulator, node_kind, options);
            }
        }
    }

    /// Applies this selector stage to `current`, emitting zero or more
    /// `(path, value)` pairs.
    pub(crate) fn select<'a>(
        &'a self,
        resources: &mut DynamicResources<'a>,
        root: &'a Value,
        stem: &Rc<PathNode>,
        current: ValueRef<'a>,
        accumulator: &mut dyn NodeAccumulator<'a>,
        node_kind: &mut NodeKind,
        options: ResultOptions,
    ) {
        match self {
            Selector::Current { .. } => {
                *node_kind = NodeKind::Single;
                self.evaluate_tail(
                    resources,
                    root,
                    stem,
                    current,
                    accumulator,
                    node_kind,
                    options,
                );
            }

            Selector::Root { id, .. } => {
                if resources.is_cached(*id) {
                    resources.retrieve_from_cache(*id, accumulator, node_kind);
                } else {
                    let root_stem = Rc::clone(resources.root_node());
                    let mut buffer = StemBuffer::default();
                    let mut kind = NodeKind::Unknown;
                    self.evaluate_tail(
                        resources,
                        root,
                        &root_stem,
                        ValueRef::Ref(root),
                        &mut buffer,
                        &mut kind,
                        options,
                    );
                    resources.add_to_cache(*id, buffer.nodes.clone(), kind);
                    *node_kind = kind;
                    for (node_stem, value) in buffer.nodes {
                        accumulator.accumulate(&node_stem, value);
                    }
                }
            }

            Selector::Identifier { name, .. } => {
                *node_kind = NodeKind::Single;
                let value = current.get();
                if value.is_object() {
                    if let Some(child) = current.member(name) {
                        let path = extend_with_member(stem, name, options);
                        self.evaluate_tail(
                            resources,
                            root,
                            &path,
                            child,
                            accumulator,
                            node_kind,
                            options,
                        );
                    }
                } else if let Some(items) = value.as_array() {
                    if let Ok(parsed) = name.parse::<i64>() {
                        let len = items.len() as i64;
                        let index = if parsed >= 0 { parsed } else { len + parsed };
                        if index >= 0 && index < len {
                            if let Some(child) = current.element(index as usize) {
                                let path = extend_with_index(stem, index as usize, options);
                                self.evaluate_tail(
                                    resources,
                                    root,
                                    &path,
                                    child,
                                    accumulator,
                                    node_kind,
                                    options,
                                );
                            }
                        }
                    } else if name == "length" && !items.is_empty() {
                        // empty arrays deliberately emit nothing here
                        let synthesized = resources.new_temp(Value::from(items.len()));
                        let path = extend_with_member(stem, name, options);
                        self.evaluate_tail(
                            resources,
                            root,
                            &path,
                            synthesized,
                            accumulator,
                            node_kind,
                            options,
                        );
                    }
                } else if let Some(s) = value.as_str() {
                    if name == "length" {
                        let synthesized = resources.new_temp(Value::from(s.chars().count()));
                        let path = extend_with_member(stem, name, options);
                        self.evaluate_tail(
                            resources,
                            root,
                            &path,
                            synthesized,
                            accumulator,
                            node_kind,
                            options,
                        );
                    }
                }
            }

            Selector::Index { index, .. } => {
                *node_kind = NodeKind::Single;
                if let Some(items) = current.get().as_array() {
                    let len = items.len() as i64;
                    let resolved = if *index >= 0 && *index < len {
                        Some(*index as usize)
                    } else if len + *index >= 0 && len + *index < len {
                        Some((len + *index) as usize)
                    } else {
                        None
                    };
                    if let Some(i) = resolved {
                        if let Some(child) = current.element(i) {
                            let path = extend_with_index(stem, i, options);
                            self.evaluate_tail(
                                resources,
                                root,
                                &path,
                                child,
                                accumulator,
                                node_kind,
                                options,
                            );
                        }
                    }
                }
            }

            Selector::Wildcard { .. } => {
                *node_kind = NodeKind::Multi;
                let mut tail_kind = NodeKind::Unknown;
                let value = current.get();
                if let Some(items) = value.as_array() {
                    for i in 0..items.len() {
                        if let Some(child) = current.element(i) {
                            let path = extend_with_index(stem, i, options);
                            self.evaluate_tail(
                                resources,
                                root,
                                &path,
                                child,
                                accumulator,
                                &mut tail_kind,
                                options,
                            );
                        }
                    }
                } else if let Some(members) = value.as_object() {
                    let names: Vec<&str> = members.keys().map(String::as_str).collect();
                    for name in names {
                        if let Some(child) = current.member(name) {
                            let path = extend_with_member(stem, name, options);
                            self.evaluate_tail(
                                resources,
                                root,
                                &path,
                                child,
                                accumulator,
                                &mut tail_kind,
                                options,
                            );
                        }
                    }
                }
            }

            Selector::Slice { slice, .. } => {
                *node_kind = NodeKind::Multi;
                if let Some(items) = current.get().as_array() {
                    let len = items.len();
                    let step = slice.step();
                    if step > 0 {
                        let start = slice.get_start(len).max(0);
                        let stop = slice.get_stop(len).min(len as i64);
                        let mut i = start;
                        while i < stop {
                            let index = i as usize;
                            if let Some(child) = current.element(index) {
                                let path = extend_with_index(stem, index, options);
                                self.evaluate_tail(
                                    resources,
                                    root,
                                    &path,
                                    child,
                                    accumulator,
                                    node_kind,
                                    options,
                                );
                            }
                            i += step;
                        }
                    } else if step < 0 {
                        let start = slice.get_start(len).min(len as i64 - 1);
                        let stop = slice.get_stop(len).max(-1);
                        let mut i = start;
                        while i > stop {
                            if i >= 0 && (i as usize) < len {
                                let index = i as usize;
                                if let Some(child) = current.element(index) {
                                    let path = extend_with_index(stem, index, options);
                                    self.evaluate_tail(
                                        resources,
                                        root,
                                        &path,
                                        child,
                                        accumulator,
                                        node_kind,
                                        options,
                                    );
                                }
                            }
                            i += step;
                        }
                    }
                }
            }

            Selector::RecursiveDescent { .. } => {
                let value = current.get();
                if let Some(items) = value.as_array() {
                    *node_kind = NodeKind::Multi;
                    self.evaluate_tail(
                        resources,
                        root,
                        stem,
                        current.clone(),
                        accumulator,
                        node_kind,
                        options,
                    );
                    for i in 0..items.len() {
                        if let Some(child) = current.element(i) {
                            let path = extend_with_index(stem, i, options);
                            self.select(
                                resources,
                                root,
                                &path,
                                child,
                                accumulator,
                                node_kind,
                                options,
                            );
                        }
                    }
                } else if let Some(members) = value.as_object() {
                    *node_kind = NodeKind::Multi;
                    self.evaluate_tail(
                        resources,
                        root,
                        stem,
                        current.clone(),
                        accumulator,
                        node_kind,
                        options,
                    );
                    let names: Vec<&str> = members.keys().map(String::as_str).collect();
                    for name in names {
                        if let Some(child) = current.member(name) {
                            let path = extend_with_member(stem, name, options);
                            self.select(
                                resources,
                                root,
                                &path,
                                child,
                                accumulator,
                                node_kind,
                                options,
                            );
                        }
                    }
                }
            }

            Selector::Union { branches, .. } => {
                *node_kind = NodeKind::Multi;
                for branch in branches {
                    // stage each branch, then thread its emissions through
                    // this stage's tail in declaration order
                    let mut staged = StemBuffer::default();
                    let mut branch_kind = NodeKind::Unknown;
                    branch.select(
                        resources,
                        root,
                        stem,
                        current.clone(),
                        &mut staged,
                        &mut branch_kind,
                        options,
                    );
                    for (branch_stem, value) in staged.nodes {
                        self.evaluate_tail(
                            resources,
                            root,
                            &branch_stem,
                            value,
                            accumulator,
                            node_kind,
                            options,
                        );
                    }
                }
            }

            Selector::Filter { expr, .. } => {
                let value = current.get();
                if let Some(items) = value.as_array() {
                    for i in 0..items.len() {
                        if let Some(child) = current.element(i) {
                            let mut child_error = None;
                            let verdict = expr.evaluate_single(
                                resources,
                                root,
                                child.clone(),
                                options,
                                &mut child_error,
                            );
                            if child_error.is_none() && is_truthy(&verdict) {
                                let path = extend_with_index(stem, i, options);
                                self.evaluate_tail(
                                    resources,
                                    root,
                                    &path,
                                    child,
                                    accumulator,
                                    node_kind,
                                    options,
                                );
                            }
                        }
                    }
                } else if let Some(members) = value.as_object() {
                    let names: Vec<&str> = members.keys().map(String::as_str).collect();
                    for name in names {
                        if let Some(child) = current.member(name) {
                            let mut child_error = None;
                            let verdict = expr.evaluate_single(
                                resources,
                                root,
                                child.clone(),
                                options,
                                &mut child_error,
                            );
                            if child_error.is_none() && is_truthy(&verdict) {
                                let path = extend_with_member(stem, name, options);
                                self.evaluate_tail(
                                    resources,
                                    root,
                                    &path,
                                    child,
                                    accumulator,
                                    node_kind,
                                    options,
                                );
                            }
                        }
                    }
                }
            }

            Selector::IndexExpression { expr, .. } => {
                let mut expr_error = None;
                let computed = expr.evaluate_single(
                    resources,
                    root,
                    current.clone(),
                    options,
                    &mut expr_error,
                );
                if expr_error.is_some() {
                    return;
                }
                let value = current.get();
                if let (Some(parsed), Some(items)) = (computed.as_i64(), value.as_array()) {
                    let len = items.len() as i64;
                    let index = if parsed >= 0 { parsed } else { len + parsed };
                    if index >= 0 && index < len {
                        if let Some(child) = current.element(index as usize) {
                            let path = extend_with_index(stem, index as usize, options);
                            self.evaluate_tail(
                                resources,
                                root,
                                &path,
                                child,
                                accumulator,
                                node_kind,
                                options,
                            );
                        }
                    }
                } else if let (Some(name), true) = (computed.as_str(), value.is_object()) {
                    if let Some(child) = current.member(name) {
                        let path = extend_with_member(stem, name, options);
                        self.evaluate_tail(
                            resources,
                            root,
                            &path,
                            child,
                            accumulator,
                            node_kind,
                            options,
                        );
                    }
                }
            }

            Selector::FunctionResult { expr, .. } => {
                *node_kind = NodeKind::Single;
                let mut expr_error = None;
                let computed = expr.evaluate_single(
                    resources,
                    root,
                    current,
                    options,
                    &mut expr_error,
                );
                if expr_error.is_none() {
                    let synthesized = resources.new_temp(computed);
                    self.evaluate_tail(
                        resources,
                        root,
                        stem,
                        synthesized,
                        accumulator,
                        node_kind,
                        options,
                    );
                }
            }
        }
    }
}
