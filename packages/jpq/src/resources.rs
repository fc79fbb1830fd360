//! Per-evaluation dynamic resources
//!
//! One [`DynamicResources`] instance lives for exactly one `evaluate` call.
//! It owns the stable `$`/`@` sentinel path nodes, hands out shared-owned
//! transient values for engine-created nodes, and holds the subquery cache
//! that lets repeated `$`-anchored sub-expressions evaluate once.
//!
//! Compiled expressions are immutable; evaluating the same expression
//! concurrently is safe as long as each evaluation owns its own resources.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::core_evaluator::NodeAccumulator;
use crate::expression::{NodeKind, ValueRef};
use crate::normalized_paths::PathNode;

/// Cached output of a `$`-anchored subquery: the buffered stem emissions
/// plus the node kind the subquery stamped.
type CachedNodes<'a> = (Vec<(Rc<PathNode>, ValueRef<'a>)>, NodeKind);

pub(crate) struct DynamicResources<'a> {
    cache: HashMap<u32, CachedNodes<'a>>,
    root_node: Rc<PathNode>,
    current_node: Rc<PathNode>,
}

impl<'a> DynamicResources<'a> {
    pub(crate) fn new() -> Self {
        Self {
            cache: HashMap::new(),
            root_node: PathNode::root(),
            current_node: PathNode::current(),
        }
    }

    /// The `$` sentinel; stable for the whole evaluation.
    #[inline]
    pub(crate) fn root_node(&self) -> &Rc<PathNode> {
        &self.root_node
    }

    /// The `@` sentinel; stable for the whole evaluation.
    #[inline]
    pub(crate) fn current_node(&self) -> &Rc<PathNode> {
        &self.current_node
    }

    /// Wraps an engine-created value so aliases to it stay alive as long as
    /// anything downstream still holds them.
    #[inline]
    pub(crate) fn new_temp(&self, value: Value) -> ValueRef<'a> {
        ValueRef::Temp(Rc::new(value))
    }

    pub(crate) fn is_cached(&self, id: u32) -> bool {
        self.cache.contains_key(&id)
    }

    pub(crate) fn add_to_cache(
        &mut self,
        id: u32,
        nodes: Vec<(Rc<PathNode>, ValueRef<'a>)>,
        kind: NodeKind,
    ) {
        self.cache.insert(id, (nodes, kind));
    }

    /// Replays the cached emissions for `id` into `accumulator`.
    pub(crate) fn retrieve_from_cache(
        &self,
        id: u32,
        accumulator: &mut dyn NodeAccumulator<'a>,
        node_kind: &mut NodeKind,
    ) {
        if let Some((nodes, kind)) = self.cache.get(&id) {
            for (stem, value) in nodes {
                accumulator.accumulate(stem, value.clone());
            }
            *node_kind = *kind;
        }
    }
}
