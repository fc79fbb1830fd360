//! Selector catalog
//!
//! A compiled JSONPath expression is a chain of selectors, each holding a
//! `tail` pointer to the next stage. Execution (in `core_evaluator`) walks
//! the chain for every candidate value; each stage emits zero or more
//! `(path, value)` pairs into its tail. `append_selector` always attaches at
//! the deepest tail, which is how the compiler grows the chain one stage at
//! a time.

use crate::expression::Expression;

/// A `[start:stop:step]` slice specifier with Python-style normalization.
///
/// Missing bounds default by step direction: `start` to the front (forward)
/// or the back (reverse), `stop` to one past the back (forward) or one
/// before the front (reverse).
#[derive(Debug, Clone, Default)]
pub struct Slice {
    pub(crate) start: Option<i64>,
    pub(crate) stop: Option<i64>,
    pub(crate) step: Option<i64>,
}

impl Slice {
    #[inline]
    pub(crate) fn step(&self) -> i64 {
        self.step.unwrap_or(1)
    }

    pub(crate) fn get_start(&self, size: usize) -> i64 {
        let size = size as i64;
        match self.start {
            Some(start) => {
                let len = if start >= 0 { start } else { size + start };
                len.min(size)
            }
            None => {
                if self.step() >= 0 {
                    0
                } else {
                    size
                }
            }
        }
    }

    pub(crate) fn get_stop(&self, size: usize) -> i64 {
        let size = size as i64;
        match self.stop {
            Some(stop) => {
                let len = if stop >= 0 { stop } else { size + stop };
                len.min(size)
            }
            None => {
                if self.step() >= 0 {
                    size
                } else {
                    -1
                }
            }
        }
    }
}

/// One stage of a selector chain.
///
/// Every variant carries `tail`: the next stage, or `None` for the terminal
/// stage whose emissions go straight into the accumulator.
#[derive(Debug)]
pub(crate) enum Selector {
    /// `$` in expression position; resets current to root and caches its
    /// subquery output under the compiler-assigned id
    Root {
        id: u32,
        tail: Option<Box<Selector>>,
    },
    /// `@`; forwards the current value unchanged
    Current { tail: Option<Box<Selector>> },
    /// `.name` / `['name']`; object member lookup with array-index and
    /// `length` fallbacks
    Identifier {
        name: String,
        tail: Option<Box<Selector>>,
    },
    /// `[5]` / `[-1]`
    Index {
        index: i64,
        tail: Option<Box<Selector>>,
    },
    /// `*` / `[*]`
    Wildcard { tail: Option<Box<Selector>> },
    /// `[start:stop:step]`
    Slice {
        slice: Slice,
        tail: Option<Box<Selector>>,
    },
    /// `..`
    RecursiveDescent { tail: Option<Box<Selector>> },
    /// `[a,b,?(...),...]`; branch emissions concatenate in declaration order
    Union {
        branches: Vec<Selector>,
        tail: Option<Box<Selector>>,
    },
    /// `[?(expr)]`; keeps children whose program evaluates truthy
    Filter {
        expr: Expression,
        tail: Option<Box<Selector>>,
    },
    /// `[(expr)]`; integer result indexes an array, string result looks up
    /// an object key
    IndexExpression {
        expr: Expression,
        tail: Option<Box<Selector>>,
    },
    /// A function call in path position; the computed value feeds the tail
    FunctionResult {
        expr: Expression,
        tail: Option<Box<Selector>>,
    },
}

impl Selector {
    pub(crate) fn current_node() -> Selector {
        Selector::Current { tail: None }
    }

    pub(crate) fn tail(&self) -> Option<&Selector> {
        self.tail_slot().as_deref()
    }

    fn tail_slot(&self) -> &Option<Box<Selector>> {
        match self {
            Selector::Root { tail, .. }
            | Selector::Current { tail }
            | Selector::Identifier { tail, .. }
            | Selector::Index { tail, .. }
            | Selector::Wildcard { tail }
            | Selector::Slice { tail, .. }
            | Selector::RecursiveDescent { tail }
            | Selector::Union { tail, .. }
            | Selector::Filter { tail, .. }
            | Selector::IndexExpression { tail, .. }
            | Selector::FunctionResult { tail, .. } => tail,
        }
    }

    fn tail_slot_mut(&mut self) -> &mut Option<Box<Selector>> {
        match self {
            Selector::Root { tail, .. }
            | Selector::Current { tail }
            | Selector::Identifier { tail, .. }
            | Selector::Index { tail, .. }
            | Selector::Wildcard { tail }
            | Selector::Slice { tail, .. }
            | Selector::RecursiveDescent { tail }
            | Selector::Union { tail, .. }
            | Selector::Filter { tail, .. }
            | Selector::IndexExpression { tail, .. }
            | Selector::FunctionResult { tail, .. } => tail,
        }
    }

    /// Attaches `next` at the deepest tail of this chain.
    pub(crate) fn append_selector(&mut self, next: Box<Selector>) {
        let slot = self.tail_slot_mut();
        match slot {
            Some(tail) => tail.append_selector(next),
            None => *slot = Some(next),
        }
    }
}
