//! JSONPath query engine over `serde_json` values
//!
//! `jpq` compiles a JSONPath expression once into an executable selector
//! chain, then evaluates it against in-memory JSON documents, producing the
//! matching values, their normalized paths, or both.
//!
//! The expression language is a superset of Goessner JSONPath: filters
//! `[?(...)]` with `&&`/`||`/`!`, comparisons, arithmetic, regex matching
//! `=~ /.../i`, function calls (`length`, `sum`, `max`, `tokenize`, ...),
//! slices `[start:stop:step]`, unions `[a,b]`, recursive descent `..`, and
//! computed indices `[(@.length - 1)]`.
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//!
//! let doc = json!({"store": {"book": [
//!     {"title": "Sayings of the Century", "price": 8.95},
//!     {"title": "The Lord of the Rings", "price": 22.99}
//! ]}});
//!
//! let expr = jpq::compile("$.store.book[?(@.price < 10)].title").expect("valid expression");
//! let matches = expr.evaluate(&doc, jpq::ResultOptions::VALUE);
//! assert_eq!(matches, json!(["Sayings of the Century"]));
//! ```
//!
//! Compiled expressions are immutable; evaluate one as many times as you
//! like, including from several threads at once.

mod ast;
mod compiler;
mod core_evaluator;
mod error;
mod expression;
mod functions;
mod normalized_paths;
mod options;
mod resources;
mod tokens;

use serde_json::Value;

use ast::Selector;
use compiler::JsonPathCompiler;
use core_evaluator::{sort_and_dedup, CallbackAccumulator, NodeBuffer};
use expression::{NodeKind, ValueRef};
use resources::DynamicResources;

pub use error::{ErrorKind, JsonPathError, JsonPathResult};
pub use functions::CustomFunctions;
pub use normalized_paths::{NormalizedPath, PathSegment};
pub use options::ResultOptions;

/// A compiled JSONPath expression, ready for repeated evaluation.
///
/// Produced by [`compile`] or [`compile_with_functions`]. Compilation is a
/// pure function of the source string and the function registry; no partial
/// expression ever escapes a failed compile.
#[derive(Debug)]
pub struct CompiledExpression {
    selector: Box<Selector>,
}

impl CompiledExpression {
    /// Evaluates against `instance` and returns a JSON array of the matched
    /// values, or of normalized path strings when `options` contains
    /// [`ResultOptions::PATH`].
    #[must_use]
    pub fn evaluate(&self, instance: &Value, options: ResultOptions) -> Value {
        let mut results: Vec<Value> = Vec::new();
        if options.contains(ResultOptions::PATH) {
            self.evaluate_inner(instance, options, &mut |path, _| {
                results.push(Value::String(path.as_str().to_string()));
            });
        } else {
            self.evaluate_inner(instance, options, &mut |_, value| {
                results.push(value.clone());
            });
        }
        Value::Array(results)
    }

    /// Evaluates against `instance`, invoking `callback` for every matched
    /// `(path, value)` pair. Paths are always generated in this form.
    pub fn evaluate_with_callback<F>(&self, instance: &Value, options: ResultOptions, mut callback: F)
    where
        F: FnMut(&NormalizedPath, &Value),
    {
        self.evaluate_inner(instance, options.with_path(), &mut callback);
    }

    /// The matched values, cloned out of the document.
    #[must_use]
    pub fn select(&self, instance: &Value, options: ResultOptions) -> Vec<Value> {
        let mut results = Vec::new();
        self.evaluate_inner(instance, options, &mut |_, value| {
            results.push(value.clone());
        });
        results
    }

    /// The normalized paths of every match.
    #[must_use]
    pub fn select_paths(&self, instance: &Value, options: ResultOptions) -> Vec<NormalizedPath> {
        let mut results = Vec::new();
        self.evaluate_inner(instance, options.with_path(), &mut |path, _| {
            results.push(path.clone());
        });
        results
    }

    /// `(path, value)` pairs for every match.
    #[must_use]
    pub fn select_nodes(
        &self,
        instance: &Value,
        options: ResultOptions,
    ) -> Vec<(NormalizedPath, Value)> {
        let mut results = Vec::new();
        self.evaluate_inner(instance, options.with_path(), &mut |path, value| {
            results.push((path.clone(), value.clone()));
        });
        results
    }

    /// Runs the selector chain. Emissions stream straight into the callback
    /// unless sorting or de-duplication require buffering first.
    fn evaluate_inner<'a>(
        &'a self,
        instance: &'a Value,
        options: ResultOptions,
        callback: &mut dyn FnMut(&NormalizedPath, &Value),
    ) {
        let mut resources = DynamicResources::new();
        let root_stem = resources.root_node().clone();
        let mut kind = NodeKind::Unknown;

        if options.nodups() || options.sort() {
            let mut buffer = NodeBuffer::default();
            self.selector.select(
                &mut resources,
                instance,
                &root_stem,
                ValueRef::Ref(instance),
                &mut buffer,
                &mut kind,
                options,
            );
            let mut nodes = buffer.into_nodes();
            sort_and_dedup(&mut nodes, options);
            for node in &nodes {
                callback(&node.path, node.value.get());
            }
        } else {
            let mut accumulator = CallbackAccumulator { callback };
            self.selector.select(
                &mut resources,
                instance,
                &root_stem,
                ValueRef::Ref(instance),
                &mut accumulator,
                &mut kind,
                options,
            );
        }
    }
}

/// Compiles `source` into a [`CompiledExpression`].
///
/// # Errors
///
/// Returns a [`JsonPathError`] carrying the error kind and the line/column
/// where compilation stopped.
pub fn compile(source: &str) -> JsonPathResult<CompiledExpression> {
    let functions = CustomFunctions::new();
    let selector = JsonPathCompiler::new(source, &functions).compile()?;
    Ok(CompiledExpression { selector })
}

/// Compiles `source` with user-registered functions available alongside the
/// built-ins. Built-ins win on name collisions.
///
/// # Errors
///
/// Returns a [`JsonPathError`] on malformed source, unknown function names,
/// or compile-time arity violations.
pub fn compile_with_functions(
    source: &str,
    functions: &CustomFunctions,
) -> JsonPathResult<CompiledExpression> {
    let selector = JsonPathCompiler::new(source, functions).compile()?;
    Ok(CompiledExpression { selector })
}

/// Compiles and evaluates in one step.
///
/// # Errors
///
/// Returns a [`JsonPathError`] when `source` does not compile.
pub fn query(instance: &Value, source: &str, options: ResultOptions) -> JsonPathResult<Value> {
    let expr = compile(source)?;
    Ok(expr.evaluate(instance, options))
}

/// Replaces every value matching `source` with a clone of `new_value`.
///
/// Matches are located first (with duplicate paths removed), then mutated
/// through path navigation, so an earlier replacement cannot corrupt the
/// addresses of later ones unless it restructures their ancestors — in
/// which case those matches are skipped.
///
/// # Errors
///
/// Returns a [`JsonPathError`] when `source` does not compile.
pub fn replace_with_value(
    instance: &mut Value,
    source: &str,
    new_value: Value,
) -> JsonPathResult<()> {
    replace_with_callback(instance, source, |_| new_value.clone())
}

/// Replaces every value matching `source` with the callback's result for
/// the current value.
///
/// # Errors
///
/// Returns a [`JsonPathError`] when `source` does not compile.
pub fn replace_with_callback<F>(
    instance: &mut Value,
    source: &str,
    mut callback: F,
) -> JsonPathResult<()>
where
    F: FnMut(&Value) -> Value,
{
    let expr = compile(source)?;
    let paths = expr.select_paths(&*instance, ResultOptions::NODUPS);
    for path in paths {
        if let Some(slot) = path.try_select_mut(instance) {
            let replacement = callback(&*slot);
            *slot = replacement;
        }
    }
    Ok(())
}
