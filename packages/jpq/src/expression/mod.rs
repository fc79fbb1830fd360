//! Postfix expression VM
//!
//! Filter predicates, computed indices, and function invocations compile to
//! postfix token programs. [`Expression::evaluate_single`] runs such a
//! program against a `(root, current)` pair using two stacks: a value stack
//! of [`ValueRef`]s and an argument stack feeding function calls.
//!
//! Runtime failures never abort the enclosing query: the offending program
//! writes an [`ErrorKind`](crate::error::ErrorKind) into the caller's
//! side-channel slot and yields null.

use std::rc::Rc;

use serde_json::Value;

use crate::core_evaluator::{sort_and_dedup, NodeBuffer};
use crate::error::ErrorKind;
use crate::options::ResultOptions;
use crate::resources::DynamicResources;
use crate::tokens::Token;

/// Hint describing the shape of a selector's emission batch, used to decide
/// whether a mid-expression selector result unwraps to a bare value or
/// wraps into an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum NodeKind {
    #[default]
    Unknown,
    Single,
    Multi,
}

/// A value alias: either a borrow into storage that outlives the evaluation
/// (the input document or a compiled literal), or a shared handle to a
/// transient value the engine created while evaluating.
///
/// Children of a borrowed value stay borrowed; children of a transient are
/// re-wrapped as fresh transients so they can outlive their parent's stack
/// frame.
#[derive(Debug, Clone)]
pub(crate) enum ValueRef<'a> {
    Ref(&'a Value),
    Temp(Rc<Value>),
}

impl<'a> ValueRef<'a> {
    #[inline]
    pub(crate) fn get(&self) -> &Value {
        match self {
            ValueRef::Ref(value) => value,
            ValueRef::Temp(value) => value,
        }
    }

    /// Object member lookup preserving alias-ness.
    pub(crate) fn member(&self, name: &str) -> Option<ValueRef<'a>> {
        match self {
            ValueRef::Ref(value) => value.get(name).map(ValueRef::Ref),
            ValueRef::Temp(value) => value
                .get(name)
                .map(|child| ValueRef::Temp(Rc::new(child.clone()))),
        }
    }

    /// Array element lookup preserving alias-ness.
    pub(crate) fn element(&self, index: usize) -> Option<ValueRef<'a>> {
        match self {
            ValueRef::Ref(value) => value.get(index).map(ValueRef::Ref),
            ValueRef::Temp(value) => value
                .get(index)
                .map(|child| ValueRef::Temp(Rc::new(child.clone()))),
        }
    }

    pub(crate) fn into_owned(self) -> Value {
        match self {
            ValueRef::Ref(value) => value.clone(),
            ValueRef::Temp(value) => Rc::try_unwrap(value).unwrap_or_else(|rc| (*rc).clone()),
        }
    }
}

/// A compiled postfix token program.
#[derive(Debug, Default)]
pub(crate) struct Expression {
    tokens: Vec<Token>,
}

impl Expression {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Runs the program and returns its single result value.
    ///
    /// An empty final stack yields null. `error` is the evaluation's
    /// side-channel failure slot; a set slot after return means the result
    /// is a failure-null rather than a computed null.
    pub(crate) fn evaluate_single<'a>(
        &'a self,
        resources: &mut DynamicResources<'a>,
        root: &'a Value,
        current: ValueRef<'a>,
        options: ResultOptions,
        error: &mut Option<ErrorKind>,
    ) -> Value {
        let mut stack: Vec<ValueRef<'a>> = Vec::new();
        let mut arg_stack: Vec<ValueRef<'a>> = Vec::new();

        for token in &self.tokens {
            match token {
                Token::Literal(value) => {
                    stack.push(ValueRef::Ref(value));
                }
                Token::Root => {
                    stack.push(ValueRef::Ref(root));
                }
                Token::Current => {
                    stack.push(current.clone());
                }
                Token::Unary(op) => {
                    let Some(item) = stack.pop() else {
                        *error = Some(ErrorKind::SyntaxError);
                        return Value::Null;
                    };
                    let result = op.apply(item.get());
                    stack.push(ValueRef::Temp(Rc::new(result)));
                }
                Token::Binary(op) => {
                    let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) else {
                        *error = Some(ErrorKind::SyntaxError);
                        return Value::Null;
                    };
                    let result = op.apply(lhs.get(), rhs.get());
                    stack.push(ValueRef::Temp(Rc::new(result)));
                }
                Token::Argument => {
                    if let Some(item) = stack.pop() {
                        arg_stack.push(item);
                    }
                }
                Token::Function(handle) => {
                    let result = handle.evaluate(&arg_stack, error);
                    if error.is_some() {
                        tracing::debug!(
                            target: "jpq::expression",
                            function = handle.name(),
                            error = ?error,
                            "function evaluation failed"
                        );
                        return Value::Null;
                    }
                    arg_stack.clear();
                    stack.push(ValueRef::Temp(Rc::new(result)));
                }
                Token::Expression(expr) => {
                    // an empty stack means the program applies to current
                    let item = stack.pop().unwrap_or_else(|| current.clone());
                    let value = expr.evaluate_single(resources, root, item, options, error);
                    stack.push(ValueRef::Temp(Rc::new(value)));
                }
                Token::Selector(selector) => {
                    let item = stack.pop().unwrap_or_else(|| current.clone());
                    let stem = resources.current_node().clone();
                    let mut buffer = NodeBuffer::default();
                    let mut kind = NodeKind::Unknown;
                    selector.select(
                        resources,
                        root,
                        &stem,
                        item,
                        &mut buffer,
                        &mut kind,
                        options,
                    );
                    let mut nodes = buffer.into_nodes();
                    sort_and_dedup(&mut nodes, options);
                    stack.push(collapse(nodes, kind));
                }

                // structural markers never survive compilation
                _ => {}
            }
        }

        match stack.pop() {
            Some(top) => top.into_owned(),
            None => Value::Null,
        }
    }
}

/// Collapses a selector token's emission batch into one stack item: null
/// for nothing, the bare value for a singleton when the node kind permits,
/// otherwise an array.
fn collapse<'a>(
    nodes: Vec<crate::core_evaluator::PathValueNode<'a>>,
    kind: NodeKind,
) -> ValueRef<'a> {
    if nodes.is_empty() {
        ValueRef::Temp(Rc::new(Value::Null))
    } else if nodes.len() == 1 && matches!(kind, NodeKind::Single | NodeKind::Unknown) {
        let mut nodes = nodes;
        match nodes.pop() {
            Some(node) => node.value,
            None => ValueRef::Temp(Rc::new(Value::Null)),
        }
    } else {
        let items: Vec<Value> = nodes.iter().map(|node| node.value.get().clone()).collect();
        ValueRef::Temp(Rc::new(Value::Array(items)))
    }
}
