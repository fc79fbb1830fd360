//! Error kinds and the compile-time error type

use std::error::Error;
use std::fmt;

/// Everything that can go wrong while compiling or evaluating a JSONPath
/// expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed expression with no more specific diagnosis
    SyntaxError,
    /// Input ended inside an unfinished construct
    UnexpectedEof,
    /// A `(` without its `)`, or the other way round
    UnbalancedParentheses,
    /// Expression must start with `$` or a function call
    ExpectedRootOrFunction,
    /// A `.` must be followed by a key
    ExpectedKey,
    /// Expected `.` or `[` to continue a path
    ExpectedSeparator,
    /// `=~` must be followed by a `/.../` regex literal
    ExpectedForwardSlash,
    /// A lone `|` where `||` was required
    ExpectedOr,
    /// A lone `&` where `&&` was required
    ExpectedAnd,
    /// `!` not followed by `=` in comparison position
    ExpectedComparator,
    /// Expected `,` or `]` inside a bracket expression
    ExpectedCommaOrRightBracket,
    /// Expected `]`
    ExpectedRightBracket,
    /// `[` not followed by a valid bracket specifier or union
    ExpectedBracketSpecifierOrUnion,
    /// Unparseable number or index
    InvalidNumber,
    /// Bad `\uXXXX` escape or unconvertible code point
    InvalidCodepoint,
    /// Unknown escape character after `\`
    IllegalEscapedCharacter,
    /// Slice step of zero
    StepCannotBeZero,
    /// Function name not found among built-ins or registered functions
    UnknownFunction,
    /// Function called with the wrong number of arguments
    InvalidArity,
    /// Function or operator applied to a value of the wrong type
    InvalidType,
    /// Embedded JSON literal rejected by the JSON parser
    InvalidJson,
}

impl ErrorKind {
    /// Human-readable message for this kind.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::UnexpectedEof => "unexpected end of input",
            ErrorKind::UnbalancedParentheses => "unbalanced parentheses",
            ErrorKind::ExpectedRootOrFunction => "expected '$' or function expression",
            ErrorKind::ExpectedKey => "expected a key",
            ErrorKind::ExpectedSeparator => "expected '.' or '['",
            ErrorKind::ExpectedForwardSlash => "expected '/'",
            ErrorKind::ExpectedOr => "expected '||'",
            ErrorKind::ExpectedAnd => "expected '&&'",
            ErrorKind::ExpectedComparator => "expected a comparison operator",
            ErrorKind::ExpectedCommaOrRightBracket => "expected ',' or ']'",
            ErrorKind::ExpectedRightBracket => "expected ']'",
            ErrorKind::ExpectedBracketSpecifierOrUnion => {
                "expected a bracket specifier or union"
            }
            ErrorKind::InvalidNumber => "invalid number",
            ErrorKind::InvalidCodepoint => "invalid code point",
            ErrorKind::IllegalEscapedCharacter => "illegal escaped character",
            ErrorKind::StepCannotBeZero => "slice step cannot be zero",
            ErrorKind::UnknownFunction => "unknown function",
            ErrorKind::InvalidArity => "invalid number of function arguments",
            ErrorKind::InvalidType => "invalid type for operation",
            ErrorKind::InvalidJson => "invalid embedded JSON literal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A JSONPath compilation error with source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPathError {
    pub kind: ErrorKind,
    /// 1-based line of the offending character
    pub line: usize,
    /// 1-based column of the offending character
    pub column: usize,
}

impl JsonPathError {
    #[must_use]
    pub fn new(kind: ErrorKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

impl fmt::Display for JsonPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {} column {}",
            self.kind.message(),
            self.line,
            self.column
        )
    }
}

impl Error for JsonPathError {}

/// Result type for JSONPath compilation.
pub type JsonPathResult<T> = Result<T, JsonPathError>;
