//! Function library
//!
//! Built-in functions plus user registration. Lookup tries the built-in
//! table first, then the registered custom functions, so built-ins win on a
//! name collision. Arity is checked at compile time when the function
//! declares one; runtime violations (wrong argument kinds, arity of
//! no-declared-arity customs) write an [`ErrorKind`] into the evaluation's
//! side-channel slot and yield null.

mod regex_cache;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ErrorKind;
use crate::expression::ValueRef;
use crate::tokens::values_equal;
use regex_cache::REGEX_CACHE;

/// Signature of a user-registered function: argument values in, result out,
/// failures reported through the error slot.
pub type CustomFunctionFn =
    dyn Fn(&[Value], &mut Option<ErrorKind>) -> Value + Send + Sync;

#[derive(Clone)]
pub(crate) struct CustomFunctionDef {
    name: String,
    arity: Option<usize>,
    function: Arc<CustomFunctionFn>,
}

/// Registry of user functions passed to
/// [`compile_with_functions`](crate::compile_with_functions).
#[derive(Clone, Default)]
pub struct CustomFunctions {
    functions: HashMap<String, CustomFunctionDef>,
}

impl CustomFunctions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function` under `name`. `arity`, when given, is enforced
    /// at compile time.
    pub fn register<F>(&mut self, name: &str, arity: Option<usize>, function: F)
    where
        F: Fn(&[Value], &mut Option<ErrorKind>) -> Value + Send + Sync + 'static,
    {
        self.functions.insert(
            name.to_string(),
            CustomFunctionDef {
                name: name.to_string(),
                arity,
                function: Arc::new(function),
            },
        );
    }

    pub(crate) fn get(&self, name: &str) -> Option<&CustomFunctionDef> {
        self.functions.get(name)
    }
}

impl fmt::Debug for CustomFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFunctions")
            .field("names", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The built-in function set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuiltinFunction {
    Abs,
    Ceil,
    Floor,
    ToNumber,
    Contains,
    StartsWith,
    EndsWith,
    Length,
    Keys,
    Sum,
    Prod,
    Avg,
    Min,
    Max,
    Tokenize,
}

impl BuiltinFunction {
    fn from_name(name: &str) -> Option<BuiltinFunction> {
        Some(match name {
            "abs" => BuiltinFunction::Abs,
            "ceil" => BuiltinFunction::Ceil,
            "floor" => BuiltinFunction::Floor,
            "to_number" => BuiltinFunction::ToNumber,
            "contains" => BuiltinFunction::Contains,
            "starts_with" => BuiltinFunction::StartsWith,
            "ends_with" => BuiltinFunction::EndsWith,
            "length" | "count" => BuiltinFunction::Length,
            "keys" => BuiltinFunction::Keys,
            "sum" => BuiltinFunction::Sum,
            "prod" => BuiltinFunction::Prod,
            "avg" => BuiltinFunction::Avg,
            "min" => BuiltinFunction::Min,
            "max" => BuiltinFunction::Max,
            "tokenize" => BuiltinFunction::Tokenize,
            _ => return None,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            BuiltinFunction::Abs => "abs",
            BuiltinFunction::Ceil => "ceil",
            BuiltinFunction::Floor => "floor",
            BuiltinFunction::ToNumber => "to_number",
            BuiltinFunction::Contains => "contains",
            BuiltinFunction::StartsWith => "starts_with",
            BuiltinFunction::EndsWith => "ends_with",
            BuiltinFunction::Length => "length",
            BuiltinFunction::Keys => "keys",
            BuiltinFunction::Sum => "sum",
            BuiltinFunction::Prod => "prod",
            BuiltinFunction::Avg => "avg",
            BuiltinFunction::Min => "min",
            BuiltinFunction::Max => "max",
            BuiltinFunction::Tokenize => "tokenize",
        }
    }

    fn arity(&self) -> usize {
        match self {
            BuiltinFunction::Contains
            | BuiltinFunction::StartsWith
            | BuiltinFunction::EndsWith
            | BuiltinFunction::Tokenize => 2,
            _ => 1,
        }
    }

    fn evaluate(&self, args: &[ValueRef<'_>], error: &mut Option<ErrorKind>) -> Value {
        match self {
            BuiltinFunction::Abs => abs(args[0].get(), error),
            BuiltinFunction::Ceil => round(args[0].get(), f64::ceil, error),
            BuiltinFunction::Floor => round(args[0].get(), f64::floor, error),
            BuiltinFunction::ToNumber => to_number(args[0].get(), error),
            BuiltinFunction::Contains => contains(args[0].get(), args[1].get(), error),
            BuiltinFunction::StartsWith => {
                string_pair(args[0].get(), args[1].get(), error, |a: &str, b: &str| a.starts_with(b))
            }
            BuiltinFunction::EndsWith => {
                string_pair(args[0].get(), args[1].get(), error, |a: &str, b: &str| a.ends_with(b))
            }
            BuiltinFunction::Length => length(args[0].get(), error),
            BuiltinFunction::Keys => keys(args[0].get(), error),
            BuiltinFunction::Sum => sum(args[0].get(), error),
            BuiltinFunction::Prod => prod(args[0].get(), error),
            BuiltinFunction::Avg => avg(args[0].get(), error),
            BuiltinFunction::Min => extremum(args[0].get(), error, false),
            BuiltinFunction::Max => extremum(args[0].get(), error, true),
            BuiltinFunction::Tokenize => tokenize(args[0].get(), args[1].get(), error),
        }
    }
}

/// A function slot in a compiled expression: a built-in or a registered
/// custom function captured at compile time.
#[derive(Clone)]
pub(crate) enum FunctionHandle {
    Builtin(BuiltinFunction),
    Custom(CustomFunctionDef),
}

impl FunctionHandle {
    /// Resolves `name` against the built-in table first, then `custom`.
    pub(crate) fn resolve(name: &str, custom: &CustomFunctions) -> Option<FunctionHandle> {
        if let Some(builtin) = BuiltinFunction::from_name(name) {
            return Some(FunctionHandle::Builtin(builtin));
        }
        custom.get(name).cloned().map(FunctionHandle::Custom)
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            FunctionHandle::Builtin(builtin) => builtin.name(),
            FunctionHandle::Custom(def) => &def.name,
        }
    }

    pub(crate) fn arity(&self) -> Option<usize> {
        match self {
            FunctionHandle::Builtin(builtin) => Some(builtin.arity()),
            FunctionHandle::Custom(def) => def.arity,
        }
    }

    pub(crate) fn evaluate(
        &self,
        args: &[ValueRef<'_>],
        error: &mut Option<ErrorKind>,
    ) -> Value {
        if let Some(arity) = self.arity() {
            if args.len() != arity {
                *error = Some(ErrorKind::InvalidArity);
                return Value::Null;
            }
        }
        match self {
            FunctionHandle::Builtin(builtin) => builtin.evaluate(args, error),
            FunctionHandle::Custom(def) => {
                let owned: Vec<Value> = args.iter().map(|a| a.get().clone()).collect();
                (def.function)(&owned, error)
            }
        }
    }
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionHandle({})", self.name())
    }
}

fn abs(arg: &Value, error: &mut Option<ErrorKind>) -> Value {
    match arg {
        Value::Number(n) => {
            if n.as_u64().is_some() {
                arg.clone()
            } else if let Some(i) = n.as_i64() {
                if i >= 0 {
                    arg.clone()
                } else {
                    i.checked_abs().map_or(Value::Null, Value::from)
                }
            } else if let Some(f) = n.as_f64() {
                Value::from(f.abs())
            } else {
                Value::Null
            }
        }
        _ => {
            *error = Some(ErrorKind::InvalidType);
            Value::Null
        }
    }
}

fn round(arg: &Value, op: fn(f64) -> f64, error: &mut Option<ErrorKind>) -> Value {
    match arg {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.as_f64().map_or(Value::Null, Value::from)
            } else {
                n.as_f64().map_or(Value::Null, |f| Value::from(op(f)))
            }
        }
        _ => {
            *error = Some(ErrorKind::InvalidType);
            Value::Null
        }
    }
}

fn to_number(arg: &Value, error: &mut Option<ErrorKind>) -> Value {
    match arg {
        Value::Number(_) => arg.clone(),
        Value::String(s) => {
            if let Ok(u) = s.parse::<u64>() {
                Value::from(u)
            } else if let Ok(i) = s.parse::<i64>() {
                Value::from(i)
            } else if let Ok(f) = s.parse::<f64>() {
                Value::from(f)
            } else {
                // unparseable strings are null, not an error
                Value::Null
            }
        }
        _ => {
            *error = Some(ErrorKind::InvalidType);
            Value::Null
        }
    }
}

fn contains(arg0: &Value, arg1: &Value, error: &mut Option<ErrorKind>) -> Value {
    match arg0 {
        Value::Array(items) => Value::Bool(items.iter().any(|item| values_equal(item, arg1))),
        Value::String(haystack) => match arg1 {
            Value::String(needle) => Value::Bool(haystack.contains(needle.as_str())),
            _ => {
                *error = Some(ErrorKind::InvalidType);
                Value::Null
            }
        },
        _ => {
            *error = Some(ErrorKind::InvalidType);
            Value::Null
        }
    }
}

fn string_pair(
    arg0: &Value,
    arg1: &Value,
    error: &mut Option<ErrorKind>,
    op: fn(&str, &str) -> bool,
) -> Value {
    match (arg0, arg1) {
        (Value::String(a), Value::String(b)) => Value::Bool(op(a, b)),
        _ => {
            *error = Some(ErrorKind::InvalidType);
            Value::Null
        }
    }
}

fn length(arg: &Value, error: &mut Option<ErrorKind>) -> Value {
    match arg {
        Value::Object(members) => Value::from(members.len()),
        Value::Array(items) => Value::from(items.len()),
        Value::String(s) => Value::from(s.chars().count()),
        _ => {
            *error = Some(ErrorKind::InvalidType);
            Value::Null
        }
    }
}

fn keys(arg: &Value, error: &mut Option<ErrorKind>) -> Value {
    match arg {
        Value::Object(members) => Value::Array(
            members
                .keys()
                .map(|k| Value::String(k.clone()))
                .collect(),
        ),
        _ => {
            *error = Some(ErrorKind::InvalidType);
            Value::Null
        }
    }
}

fn numeric_items(arg: &Value, error: &mut Option<ErrorKind>) -> Option<Vec<f64>> {
    let Value::Array(items) = arg else {
        *error = Some(ErrorKind::InvalidType);
        return None;
    };
    let mut numbers = Vec::with_capacity(items.len());
    for item in items {
        match item.as_f64() {
            Some(f) => numbers.push(f),
            None => {
                *error = Some(ErrorKind::InvalidType);
                return None;
            }
        }
    }
    Some(numbers)
}

fn sum(arg: &Value, error: &mut Option<ErrorKind>) -> Value {
    match numeric_items(arg, error) {
        Some(numbers) => Value::from(numbers.iter().sum::<f64>()),
        None => Value::Null,
    }
}

fn prod(arg: &Value, error: &mut Option<ErrorKind>) -> Value {
    if arg.as_array().map_or(true, |items| items.is_empty()) {
        *error = Some(ErrorKind::InvalidType);
        return Value::Null;
    }
    match numeric_items(arg, error) {
        Some(numbers) => Value::from(numbers.iter().product::<f64>()),
        None => Value::Null,
    }
}

fn avg(arg: &Value, error: &mut Option<ErrorKind>) -> Value {
    let Value::Array(items) = arg else {
        *error = Some(ErrorKind::InvalidType);
        return Value::Null;
    };
    if items.is_empty() {
        // empty input is null, not an error
        return Value::Null;
    }
    match numeric_items(arg, error) {
        Some(numbers) => Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64),
        None => Value::Null,
    }
}

/// `min`/`max` over an array of uniformly numeric or uniformly string items.
fn extremum(arg: &Value, error: &mut Option<ErrorKind>, want_max: bool) -> Value {
    let Value::Array(items) = arg else {
        *error = Some(ErrorKind::InvalidType);
        return Value::Null;
    };
    if items.is_empty() {
        return Value::Null;
    }
    let numeric = items[0].is_number();
    if !numeric && !items[0].is_string() {
        *error = Some(ErrorKind::InvalidType);
        return Value::Null;
    }

    let mut best = 0;
    for (i, item) in items.iter().enumerate().skip(1) {
        if item.is_number() != numeric || item.is_string() == numeric {
            *error = Some(ErrorKind::InvalidType);
            return Value::Null;
        }
        let beats = if numeric {
            let a = item.as_f64().unwrap_or(f64::NAN);
            let b = items[best].as_f64().unwrap_or(f64::NAN);
            if want_max {
                a > b
            } else {
                a < b
            }
        } else {
            let a = item.as_str().unwrap_or("");
            let b = items[best].as_str().unwrap_or("");
            if want_max {
                a > b
            } else {
                a < b
            }
        };
        if beats {
            best = i;
        }
    }
    items[best].clone()
}

fn tokenize(arg0: &Value, arg1: &Value, error: &mut Option<ErrorKind>) -> Value {
    let (Value::String(text), Value::String(pattern)) = (arg0, arg1) else {
        *error = Some(ErrorKind::InvalidType);
        return Value::Null;
    };
    match REGEX_CACHE.get_or_compile(pattern) {
        Ok(compiled) => Value::Array(
            compiled
                .split(text)
                .map(|piece| Value::String(piece.to_string()))
                .collect(),
        ),
        Err(_) => {
            *error = Some(ErrorKind::InvalidType);
            Value::Null
        }
    }
}

#[cfg(test)]
mod function_tests {
    use super::*;
    use serde_json::json;

    fn call(f: BuiltinFunction, args: &[Value]) -> (Value, Option<ErrorKind>) {
        let refs: Vec<ValueRef<'_>> = args.iter().map(ValueRef::Ref).collect();
        let mut error = None;
        let result = FunctionHandle::Builtin(f).evaluate(&refs, &mut error);
        (result, error)
    }

    #[test]
    fn test_abs() {
        assert_eq!(call(BuiltinFunction::Abs, &[json!(-3)]).0, json!(3));
        assert_eq!(call(BuiltinFunction::Abs, &[json!(-2.5)]).0, json!(2.5));
        assert_eq!(call(BuiltinFunction::Abs, &[json!(7)]).0, json!(7));
        let (result, error) = call(BuiltinFunction::Abs, &[json!("x")]);
        assert_eq!(result, Value::Null);
        assert_eq!(error, Some(ErrorKind::InvalidType));
    }

    #[test]
    fn test_ceil_floor() {
        assert_eq!(call(BuiltinFunction::Ceil, &[json!(1.2)]).0, json!(2.0));
        assert_eq!(call(BuiltinFunction::Floor, &[json!(1.8)]).0, json!(1.0));
        assert_eq!(call(BuiltinFunction::Ceil, &[json!(4)]).0, json!(4.0));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(call(BuiltinFunction::ToNumber, &[json!("42")]).0, json!(42));
        assert_eq!(
            call(BuiltinFunction::ToNumber, &[json!("-1.5")]).0,
            json!(-1.5)
        );
        // unparseable is null without an error
        let (result, error) = call(BuiltinFunction::ToNumber, &[json!("x")]);
        assert_eq!(result, Value::Null);
        assert_eq!(error, None);
    }

    #[test]
    fn test_contains() {
        assert_eq!(
            call(BuiltinFunction::Contains, &[json!([1, 2, 3]), json!(2)]).0,
            json!(true)
        );
        assert_eq!(
            call(BuiltinFunction::Contains, &[json!("hello"), json!("ell")]).0,
            json!(true)
        );
        let (_, error) = call(BuiltinFunction::Contains, &[json!("hello"), json!(5)]);
        assert_eq!(error, Some(ErrorKind::InvalidType));
    }

    #[test]
    fn test_starts_ends_with() {
        assert_eq!(
            call(BuiltinFunction::StartsWith, &[json!("abcdef"), json!("abc")]).0,
            json!(true)
        );
        assert_eq!(
            call(BuiltinFunction::EndsWith, &[json!("abcdef"), json!("def")]).0,
            json!(true)
        );
        assert_eq!(
            call(BuiltinFunction::EndsWith, &[json!("abcdef"), json!("abc")]).0,
            json!(false)
        );
    }

    #[test]
    fn test_length_counts_code_points() {
        assert_eq!(call(BuiltinFunction::Length, &[json!("héllo")]).0, json!(5));
        assert_eq!(call(BuiltinFunction::Length, &[json!([1, 2])]).0, json!(2));
        assert_eq!(
            call(BuiltinFunction::Length, &[json!({"a": 1})]).0,
            json!(1)
        );
    }

    #[test]
    fn test_keys() {
        assert_eq!(
            call(BuiltinFunction::Keys, &[json!({"a": 1, "b": 2})]).0,
            json!(["a", "b"])
        );
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(
            call(BuiltinFunction::Sum, &[json!([1, 2, 3])]).0,
            json!(6.0)
        );
        assert_eq!(
            call(BuiltinFunction::Prod, &[json!([2, 3, 4])]).0,
            json!(24.0)
        );
        assert_eq!(
            call(BuiltinFunction::Avg, &[json!([1, 2, 3])]).0,
            json!(2.0)
        );
        // avg of empty is null without an error
        let (result, error) = call(BuiltinFunction::Avg, &[json!([])]);
        assert_eq!(result, Value::Null);
        assert_eq!(error, None);
        // prod of empty is a type error
        let (_, error) = call(BuiltinFunction::Prod, &[json!([])]);
        assert_eq!(error, Some(ErrorKind::InvalidType));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(
            call(BuiltinFunction::Max, &[json!([8.95, 12.99, 8.99])]).0,
            json!(12.99)
        );
        assert_eq!(
            call(BuiltinFunction::Min, &[json!(["b", "a", "c"])]).0,
            json!("a")
        );
        let (_, error) = call(BuiltinFunction::Min, &[json!([1, "a"])]);
        assert_eq!(error, Some(ErrorKind::InvalidType));
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            call(
                BuiltinFunction::Tokenize,
                &[json!("a,b,,c"), json!(",")]
            )
            .0,
            json!(["a", "b", "", "c"])
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let (result, error) = call(BuiltinFunction::Abs, &[json!(1), json!(2)]);
        assert_eq!(result, Value::Null);
        assert_eq!(error, Some(ErrorKind::InvalidArity));
    }

    #[test]
    fn test_custom_function_resolution() {
        let mut custom = CustomFunctions::new();
        custom.register("double", Some(1), |args, _| {
            args[0].as_f64().map_or(Value::Null, |f| json!(f * 2.0))
        });
        // custom name resolves
        let handle =
            FunctionHandle::resolve("double", &custom).expect("registered function");
        let arg = json!(21);
        let refs = [ValueRef::Ref(&arg)];
        let mut error = None;
        assert_eq!(handle.evaluate(&refs, &mut error), json!(42.0));

        // built-ins win on collision
        custom.register("length", Some(1), |_, _| json!("shadowed"));
        let handle = FunctionHandle::resolve("length", &custom).expect("builtin");
        assert!(matches!(
            handle,
            FunctionHandle::Builtin(BuiltinFunction::Length)
        ));
    }
}
