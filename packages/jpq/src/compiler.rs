//! JSONPath expression compiler
//!
//! A hand-written character scanner driven by a shunting-yard parser over an
//! explicit state stack. Each loop iteration inspects the current character
//! under the top state and either consumes input or pops the state; the
//! grammar lives entirely in the state transitions.
//!
//! Tokens flow into an output stack; pending operators wait on an operator
//! stack and drain by precedence. Structural markers (`BeginFilter`,
//! `BeginUnion`, `BeginExpression`, function entries) are folded back into
//! composite selectors when their matching `End*` token arrives: the output
//! stack is scanned back to the opening marker and the enclosed span becomes
//! a single [`Selector`]. When the token below the fold is itself a path
//! selector, the composite is appended to its tail, which is how `a[?b]`
//! becomes an identifier selector whose tail is the filter.

use serde_json::Value;

use crate::ast::{Selector, Slice};
use crate::error::{ErrorKind, JsonPathError, JsonPathResult};
use crate::expression::Expression;
use crate::functions::{CustomFunctions, FunctionHandle};
use crate::tokens::{BinaryOp, Token, UnaryOp};

/// Parser states. Each state is a label on the state stack; popping a state
/// resumes the consumer that pushed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Start,
    ExpectFunctionExpr,
    PathExpression,
    PathRhs,
    FilterExpression,
    ExpressionRhs,
    RecursiveDescentOrPathExpression,
    PathOrValueOrFunction,
    JsonTextOrFunction,
    JsonTextOrFunctionName,
    JsonTextString,
    JsonValue,
    JsonString,
    IdentifierOrFunctionExpr,
    NameOrLeftBracket,
    UnquotedString,
    Number,
    FunctionExpression,
    Argument,
    ZeroOrOneArguments,
    OneOrMoreArguments,
    Identifier,
    SingleQuotedString,
    DoubleQuotedString,
    UnionExpression,
    IdentifierOrUnion,
    BracketSpecifierOrUnion,
    IndexOrSlice,
    WildcardOrUnion,
    UnionElement,
    IndexOrSliceOrUnion,
    Integer,
    Digit,
    SliceExpressionStop,
    SliceExpressionStep,
    QuotedStringEscapeChar,
    EscapeU1,
    EscapeU2,
    EscapeU3,
    EscapeU4,
    EscapeExpectSurrogatePair1,
    EscapeExpectSurrogatePair2,
    EscapeU5,
    EscapeU6,
    EscapeU7,
    EscapeU8,
    Expression,
    ComparatorExpression,
    EqOrRegex,
    ExpectRegex,
    Regex,
    CmpLtOrLte,
    CmpGtOrGte,
    CmpNe,
    ExpectOr,
    ExpectAnd,
}

pub(crate) struct JsonPathCompiler<'s> {
    input: &'s str,
    pos: usize,
    line: usize,
    column: usize,
    state_stack: Vec<ParseState>,
    output_stack: Vec<Token>,
    operator_stack: Vec<Token>,
    /// One counter per function-argument context; the top counter tracks
    /// open plain parentheses within the current sub-expression.
    paren_depth: Vec<u32>,
    selector_id: u32,
    buffer: String,
    slice: Slice,
    codepoint: u32,
    codepoint2: u32,
    functions: &'s CustomFunctions,
}

impl<'s> JsonPathCompiler<'s> {
    pub(crate) fn new(input: &'s str, functions: &'s CustomFunctions) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            state_stack: Vec::new(),
            output_stack: Vec::new(),
            operator_stack: Vec::new(),
            paren_depth: vec![0],
            selector_id: 0,
            buffer: String::new(),
            slice: Slice::default(),
            codepoint: 0,
            codepoint2: 0,
            functions,
        }
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    #[inline]
    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    #[inline]
    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            self.column += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        match self.peek() {
            Some(' ') | Some('\t') => self.advance(),
            Some('\r') => {
                self.pos += 1;
                if self.peek() == Some('\n') {
                    self.pos += 1;
                }
                self.line += 1;
                self.column = 1;
            }
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                self.column = 1;
            }
            _ => {}
        }
    }

    #[inline]
    fn err(&self, kind: ErrorKind) -> JsonPathError {
        JsonPathError::new(kind, self.line, self.column)
    }

    fn replace_state(&mut self, state: ParseState) {
        self.state_stack.pop();
        self.state_stack.push(state);
    }

    fn next_selector_id(&mut self) -> u32 {
        let id = self.selector_id;
        self.selector_id += 1;
        id
    }

    fn parse_buffer_integer(&mut self) -> JsonPathResult<i64> {
        if self.buffer.is_empty() {
            return Err(self.err(ErrorKind::InvalidNumber));
        }
        let parsed = self
            .buffer
            .parse::<i64>()
            .map_err(|_| self.err(ErrorKind::InvalidNumber))?;
        self.buffer.clear();
        Ok(parsed)
    }

    fn parse_buffer_json(&mut self) -> JsonPathResult<Value> {
        let value = serde_json::from_str::<Value>(&self.buffer)
            .map_err(|_| self.err(ErrorKind::InvalidJson))?;
        self.buffer.clear();
        Ok(value)
    }

    /// Parses an embedded JSON object or array starting at the cursor by
    /// delegating to the host JSON parser, then advances past the consumed
    /// span.
    fn parse_embedded_json(&mut self) -> JsonPathResult<Value> {
        let mut stream =
            serde_json::Deserializer::from_str(&self.input[self.pos..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                let consumed = stream.byte_offset();
                self.pos += consumed;
                self.column += consumed;
                Ok(value)
            }
            _ => Err(self.err(ErrorKind::InvalidJson)),
        }
    }

    fn resolve_function(&self) -> JsonPathResult<FunctionHandle> {
        FunctionHandle::resolve(&self.buffer, self.functions)
            .ok_or_else(|| self.err(ErrorKind::UnknownFunction))
    }

    /// Common entry for `name(` in any position: open a fresh paren-depth
    /// context and emit the implicit current-node anchor plus the function
    /// handle.
    fn begin_function(&mut self) -> JsonPathResult<()> {
        let handle = self.resolve_function()?;
        self.buffer.clear();
        self.paren_depth.push(0);
        self.push_token(Token::Current)?;
        self.push_token(Token::Function(handle))?;
        self.replace_state(ParseState::FunctionExpression);
        self.state_stack.push(ParseState::ZeroOrOneArguments);
        self.advance();
        Ok(())
    }

    fn append_to_codepoint(&self, acc: u32, c: char) -> JsonPathResult<u32> {
        let digit = c
            .to_digit(16)
            .ok_or_else(|| self.err(ErrorKind::InvalidCodepoint))?;
        Ok(acc * 16 + digit)
    }

    /// Compiles the input into the root selector chain.
    pub(crate) fn compile(mut self) -> JsonPathResult<Box<Selector>> {
        self.state_stack.push(ParseState::Start);

        while self.pos < self.input.len() && !self.state_stack.is_empty() {
            let state = match self.state_stack.last() {
                Some(state) => *state,
                None => break,
            };
            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };

            match state {
                ParseState::Start => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '$' => {
                        self.push_token(Token::Root)?;
                        self.state_stack.push(ParseState::PathRhs);
                        self.advance();
                    }
                    _ => {
                        self.state_stack.push(ParseState::PathRhs);
                        self.state_stack.push(ParseState::ExpectFunctionExpr);
                        self.state_stack.push(ParseState::UnquotedString);
                    }
                },

                ParseState::RecursiveDescentOrPathExpression => match c {
                    '.' => {
                        self.push_token(Token::Selector(Box::new(
                            Selector::RecursiveDescent { tail: None },
                        )))?;
                        self.advance();
                        self.replace_state(ParseState::NameOrLeftBracket);
                    }
                    _ => self.replace_state(ParseState::PathExpression),
                },

                ParseState::NameOrLeftBracket => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '[' => {
                        self.replace_state(ParseState::BracketSpecifierOrUnion);
                        self.advance();
                    }
                    _ => {
                        self.buffer.clear();
                        self.replace_state(ParseState::PathExpression);
                    }
                },

                ParseState::PathExpression => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '*' => {
                        self.push_token(Token::Selector(Box::new(Selector::Wildcard {
                            tail: None,
                        })))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    '\'' => {
                        self.replace_state(ParseState::Identifier);
                        self.state_stack.push(ParseState::SingleQuotedString);
                        self.advance();
                    }
                    '"' => {
                        self.replace_state(ParseState::Identifier);
                        self.state_stack.push(ParseState::DoubleQuotedString);
                        self.advance();
                    }
                    '[' => {
                        self.state_stack.push(ParseState::BracketSpecifierOrUnion);
                        self.advance();
                    }
                    '$' => {
                        let id = self.next_selector_id();
                        self.push_token(Token::Root)?;
                        self.push_token(Token::Selector(Box::new(Selector::Root {
                            id,
                            tail: None,
                        })))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    '@' => {
                        self.push_token(Token::Current)?;
                        self.push_token(Token::Selector(Box::new(Selector::current_node())))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    '.' => return Err(self.err(ErrorKind::ExpectedKey)),
                    _ => {
                        self.buffer.clear();
                        self.replace_state(ParseState::IdentifierOrFunctionExpr);
                        self.state_stack.push(ParseState::UnquotedString);
                    }
                },

                ParseState::IdentifierOrFunctionExpr => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '(' => self.begin_function()?,
                    _ => {
                        let name = std::mem::take(&mut self.buffer);
                        self.push_token(Token::Selector(Box::new(Selector::Identifier {
                            name,
                            tail: None,
                        })))?;
                        self.state_stack.pop();
                    }
                },

                ParseState::ExpectFunctionExpr => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '(' => self.begin_function()?,
                    _ => return Err(self.err(ErrorKind::ExpectedRootOrFunction)),
                },

                ParseState::FunctionExpression => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ',' => {
                        self.push_token(Token::BeginExpression)?;
                        self.state_stack.push(ParseState::Argument);
                        self.state_stack.push(ParseState::ExpressionRhs);
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.advance();
                    }
                    ')' => {
                        if self.paren_depth.len() <= 1
                            || self.paren_depth.last().copied().unwrap_or(1) != 0
                        {
                            return Err(self.err(ErrorKind::UnbalancedParentheses));
                        }
                        self.paren_depth.pop();
                        self.push_token(Token::EndFunction)?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::SyntaxError)),
                },

                ParseState::ZeroOrOneArguments => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ')' => {
                        self.state_stack.pop();
                    }
                    _ => {
                        self.push_token(Token::BeginExpression)?;
                        self.replace_state(ParseState::OneOrMoreArguments);
                        self.state_stack.push(ParseState::Argument);
                        self.state_stack.push(ParseState::ExpressionRhs);
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                    }
                },

                ParseState::OneOrMoreArguments => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ')' => {
                        self.state_stack.pop();
                    }
                    ',' => {
                        self.push_token(Token::BeginExpression)?;
                        self.state_stack.push(ParseState::Argument);
                        self.state_stack.push(ParseState::ExpressionRhs);
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::SyntaxError)),
                },

                ParseState::Argument => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ',' | ')' => {
                        self.push_token(Token::EndArgumentExpression)?;
                        self.push_token(Token::Argument)?;
                        self.state_stack.pop();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedCommaOrRightBracket)),
                },

                ParseState::UnquotedString => {
                    if c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii() {
                        self.buffer.push(c);
                        self.advance();
                    } else {
                        self.state_stack.pop();
                    }
                }

                ParseState::PathRhs => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '.' => {
                        self.state_stack
                            .push(ParseState::RecursiveDescentOrPathExpression);
                        self.advance();
                    }
                    '[' => {
                        self.state_stack.push(ParseState::BracketSpecifierOrUnion);
                        self.advance();
                    }
                    ')' => self.close_paren_or_pop()?,
                    ']' | ',' => {
                        self.state_stack.pop();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedSeparator)),
                },

                ParseState::ExpressionRhs => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '.' => {
                        self.state_stack
                            .push(ParseState::RecursiveDescentOrPathExpression);
                        self.advance();
                    }
                    '[' => {
                        self.state_stack.push(ParseState::BracketSpecifierOrUnion);
                        self.advance();
                    }
                    ')' => self.close_paren_or_pop()?,
                    '|' => {
                        self.advance();
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.state_stack.push(ParseState::ExpectOr);
                    }
                    '&' => {
                        self.advance();
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.state_stack.push(ParseState::ExpectAnd);
                    }
                    '<' | '>' => {
                        self.state_stack.push(ParseState::ComparatorExpression);
                    }
                    '=' => {
                        self.state_stack.push(ParseState::EqOrRegex);
                        self.advance();
                    }
                    '!' => {
                        self.advance();
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.state_stack.push(ParseState::CmpNe);
                    }
                    '+' => {
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.push_token(Token::Binary(BinaryOp::Plus))?;
                        self.advance();
                    }
                    '-' => {
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.push_token(Token::Binary(BinaryOp::Minus))?;
                        self.advance();
                    }
                    '*' => {
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.push_token(Token::Binary(BinaryOp::Mult))?;
                        self.advance();
                    }
                    '/' => {
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.push_token(Token::Binary(BinaryOp::Div))?;
                        self.advance();
                    }
                    ']' | ',' => {
                        self.state_stack.pop();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedSeparator)),
                },

                ParseState::ExpectOr => match c {
                    '|' => {
                        self.push_token(Token::Binary(BinaryOp::Or))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedOr)),
                },

                ParseState::ExpectAnd => match c {
                    '&' => {
                        self.push_token(Token::Binary(BinaryOp::And))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedAnd)),
                },

                ParseState::ComparatorExpression => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '<' => {
                        self.advance();
                        self.replace_state(ParseState::PathOrValueOrFunction);
                        self.state_stack.push(ParseState::CmpLtOrLte);
                    }
                    '>' => {
                        self.advance();
                        self.replace_state(ParseState::PathOrValueOrFunction);
                        self.state_stack.push(ParseState::CmpGtOrGte);
                    }
                    _ => {
                        if self.state_stack.len() > 1 {
                            self.state_stack.pop();
                        } else {
                            return Err(self.err(ErrorKind::SyntaxError));
                        }
                    }
                },

                ParseState::EqOrRegex => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '=' => {
                        self.push_token(Token::Binary(BinaryOp::Eq))?;
                        self.replace_state(ParseState::PathOrValueOrFunction);
                        self.advance();
                    }
                    '~' => {
                        self.advance();
                        self.state_stack.push(ParseState::ExpectRegex);
                    }
                    _ => {
                        if self.state_stack.len() > 1 {
                            self.state_stack.pop();
                        } else {
                            return Err(self.err(ErrorKind::SyntaxError));
                        }
                    }
                },

                ParseState::ExpectRegex => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '/' => {
                        self.replace_state(ParseState::Regex);
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedForwardSlash)),
                },

                ParseState::Regex => match c {
                    '/' => {
                        let case_insensitive = self.peek_ahead(1) == Some('i');
                        let pattern = regex::RegexBuilder::new(&self.buffer)
                            .case_insensitive(case_insensitive)
                            .build()
                            .map_err(|_| self.err(ErrorKind::SyntaxError))?;
                        self.push_token(Token::Unary(UnaryOp::Regex(pattern)))?;
                        self.buffer.clear();
                        self.state_stack.pop();
                        self.advance();
                        if case_insensitive {
                            self.advance();
                        }
                    }
                    _ => {
                        self.buffer.push(c);
                        self.advance();
                    }
                },

                ParseState::CmpLtOrLte => match c {
                    '=' => {
                        self.push_token(Token::Binary(BinaryOp::Lte))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    _ => {
                        self.push_token(Token::Binary(BinaryOp::Lt))?;
                        self.state_stack.pop();
                    }
                },

                ParseState::CmpGtOrGte => match c {
                    '=' => {
                        self.push_token(Token::Binary(BinaryOp::Gte))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    _ => {
                        self.push_token(Token::Binary(BinaryOp::Gt))?;
                        self.state_stack.pop();
                    }
                },

                ParseState::CmpNe => match c {
                    '=' => {
                        self.push_token(Token::Binary(BinaryOp::Ne))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedComparator)),
                },

                ParseState::PathOrValueOrFunction => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '$' | '@' => self.replace_state(ParseState::PathExpression),
                    '(' => {
                        self.advance();
                        if let Some(depth) = self.paren_depth.last_mut() {
                            *depth += 1;
                        }
                        self.push_token(Token::LParen)?;
                    }
                    '\'' => {
                        self.replace_state(ParseState::JsonString);
                        self.state_stack.push(ParseState::SingleQuotedString);
                        self.advance();
                    }
                    '"' => {
                        self.replace_state(ParseState::JsonString);
                        self.state_stack.push(ParseState::DoubleQuotedString);
                        self.advance();
                    }
                    '!' => {
                        self.advance();
                        self.push_token(Token::Unary(UnaryOp::Not))?;
                    }
                    '-' => {
                        // a digit after '-' is a negative literal; anything
                        // else is unary minus
                        if self.peek_ahead(1).map_or(false, |n| n.is_ascii_digit()) {
                            self.replace_state(ParseState::JsonValue);
                            self.state_stack.push(ParseState::Number);
                        } else {
                            self.advance();
                            self.push_token(Token::Unary(UnaryOp::Neg))?;
                        }
                    }
                    '0'..='9' => {
                        self.replace_state(ParseState::JsonValue);
                        self.state_stack.push(ParseState::Number);
                    }
                    _ => self.replace_state(ParseState::JsonTextOrFunctionName),
                },

                ParseState::JsonTextOrFunctionName => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '{' | '[' => {
                        let value = self.parse_embedded_json()?;
                        self.push_token(Token::Literal(value))?;
                        self.state_stack.pop();
                    }
                    '-' | '0'..='9' => {
                        self.buffer.push(c);
                        self.replace_state(ParseState::JsonTextOrFunction);
                        self.state_stack.push(ParseState::Number);
                        self.advance();
                    }
                    '"' => {
                        self.buffer.push(c);
                        self.replace_state(ParseState::JsonTextOrFunction);
                        self.state_stack.push(ParseState::JsonTextString);
                        self.advance();
                    }
                    _ => {
                        self.buffer.push(c);
                        self.replace_state(ParseState::JsonTextOrFunction);
                        self.state_stack.push(ParseState::UnquotedString);
                        self.advance();
                    }
                },

                ParseState::JsonTextOrFunction => match c {
                    '(' => self.begin_function()?,
                    _ => {
                        let value = self.parse_buffer_json()?;
                        self.push_token(Token::Literal(value))?;
                        self.state_stack.pop();
                    }
                },

                ParseState::JsonValue => {
                    let value = self.parse_buffer_json()?;
                    self.push_token(Token::Literal(value))?;
                    self.state_stack.pop();
                }

                ParseState::JsonString => {
                    let text = std::mem::take(&mut self.buffer);
                    self.push_token(Token::Literal(Value::String(text)))?;
                    self.state_stack.pop();
                }

                ParseState::Number => match c {
                    '-' | '0'..='9' | 'e' | 'E' | '.' => {
                        self.buffer.push(c);
                        self.advance();
                    }
                    _ => {
                        self.state_stack.pop();
                    }
                },

                ParseState::JsonTextString => match c {
                    '\\' => {
                        self.buffer.push(c);
                        self.advance();
                        match self.peek() {
                            Some(escaped) => {
                                self.buffer.push(escaped);
                                self.advance();
                            }
                            None => return Err(self.err(ErrorKind::UnexpectedEof)),
                        }
                    }
                    '"' => {
                        self.buffer.push(c);
                        self.state_stack.pop();
                        self.advance();
                    }
                    _ => {
                        self.buffer.push(c);
                        self.advance();
                    }
                },

                ParseState::Identifier => {
                    let name = std::mem::take(&mut self.buffer);
                    self.push_token(Token::Selector(Box::new(Selector::Identifier {
                        name,
                        tail: None,
                    })))?;
                    self.state_stack.pop();
                }

                ParseState::SingleQuotedString => match c {
                    '\'' => {
                        self.state_stack.pop();
                        self.advance();
                    }
                    '\\' => {
                        self.state_stack.push(ParseState::QuotedStringEscapeChar);
                        self.advance();
                    }
                    _ => {
                        self.buffer.push(c);
                        self.advance();
                    }
                },

                ParseState::DoubleQuotedString => match c {
                    '"' => {
                        self.state_stack.pop();
                        self.advance();
                    }
                    '\\' => {
                        self.state_stack.push(ParseState::QuotedStringEscapeChar);
                        self.advance();
                    }
                    _ => {
                        self.buffer.push(c);
                        self.advance();
                    }
                },

                ParseState::QuotedStringEscapeChar => {
                    let translated = match c {
                        '"' => Some('"'),
                        '\'' => Some('\''),
                        '\\' => Some('\\'),
                        '/' => Some('/'),
                        'b' => Some('\u{0008}'),
                        'f' => Some('\u{000C}'),
                        'n' => Some('\n'),
                        'r' => Some('\r'),
                        't' => Some('\t'),
                        'u' => None,
                        _ => return Err(self.err(ErrorKind::IllegalEscapedCharacter)),
                    };
                    match translated {
                        Some(escaped) => {
                            self.buffer.push(escaped);
                            self.advance();
                            self.state_stack.pop();
                        }
                        None => {
                            self.advance();
                            self.replace_state(ParseState::EscapeU1);
                        }
                    }
                }

                ParseState::EscapeU1 => {
                    self.codepoint = self.append_to_codepoint(0, c)?;
                    self.advance();
                    self.replace_state(ParseState::EscapeU2);
                }
                ParseState::EscapeU2 => {
                    self.codepoint = self.append_to_codepoint(self.codepoint, c)?;
                    self.advance();
                    self.replace_state(ParseState::EscapeU3);
                }
                ParseState::EscapeU3 => {
                    self.codepoint = self.append_to_codepoint(self.codepoint, c)?;
                    self.advance();
                    self.replace_state(ParseState::EscapeU4);
                }
                ParseState::EscapeU4 => {
                    self.codepoint = self.append_to_codepoint(self.codepoint, c)?;
                    if (0xD800..=0xDBFF).contains(&self.codepoint) {
                        self.advance();
                        self.replace_state(ParseState::EscapeExpectSurrogatePair1);
                    } else {
                        match char::from_u32(self.codepoint) {
                            Some(decoded) => self.buffer.push(decoded),
                            None => return Err(self.err(ErrorKind::InvalidCodepoint)),
                        }
                        self.advance();
                        self.state_stack.pop();
                    }
                }
                ParseState::EscapeExpectSurrogatePair1 => match c {
                    '\\' => {
                        self.advance();
                        self.replace_state(ParseState::EscapeExpectSurrogatePair2);
                    }
                    _ => return Err(self.err(ErrorKind::InvalidCodepoint)),
                },
                ParseState::EscapeExpectSurrogatePair2 => match c {
                    'u' => {
                        self.advance();
                        self.replace_state(ParseState::EscapeU5);
                    }
                    _ => return Err(self.err(ErrorKind::InvalidCodepoint)),
                },
                ParseState::EscapeU5 => {
                    self.codepoint2 = self.append_to_codepoint(0, c)?;
                    self.advance();
                    self.replace_state(ParseState::EscapeU6);
                }
                ParseState::EscapeU6 => {
                    self.codepoint2 = self.append_to_codepoint(self.codepoint2, c)?;
                    self.advance();
                    self.replace_state(ParseState::EscapeU7);
                }
                ParseState::EscapeU7 => {
                    self.codepoint2 = self.append_to_codepoint(self.codepoint2, c)?;
                    self.advance();
                    self.replace_state(ParseState::EscapeU8);
                }
                ParseState::EscapeU8 => {
                    self.codepoint2 = self.append_to_codepoint(self.codepoint2, c)?;
                    let combined =
                        0x10000 + ((self.codepoint & 0x3FF) << 10) + (self.codepoint2 & 0x3FF);
                    match char::from_u32(combined) {
                        Some(decoded) => self.buffer.push(decoded),
                        None => return Err(self.err(ErrorKind::InvalidCodepoint)),
                    }
                    self.state_stack.pop();
                    self.advance();
                }

                ParseState::BracketSpecifierOrUnion => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '(' => {
                        self.push_token(Token::BeginUnion)?;
                        self.push_token(Token::BeginExpression)?;
                        self.push_token(Token::LParen)?;
                        self.replace_state(ParseState::UnionExpression);
                        self.state_stack.push(ParseState::Expression);
                        self.state_stack.push(ParseState::ExpressionRhs);
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        if let Some(depth) = self.paren_depth.last_mut() {
                            *depth += 1;
                        }
                        self.advance();
                    }
                    '?' => {
                        self.push_token(Token::BeginUnion)?;
                        self.push_token(Token::BeginFilter)?;
                        self.replace_state(ParseState::UnionExpression);
                        self.state_stack.push(ParseState::FilterExpression);
                        self.state_stack.push(ParseState::ExpressionRhs);
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.advance();
                    }
                    '*' => {
                        self.replace_state(ParseState::WildcardOrUnion);
                        self.advance();
                    }
                    '\'' => {
                        self.replace_state(ParseState::IdentifierOrUnion);
                        self.state_stack.push(ParseState::SingleQuotedString);
                        self.advance();
                    }
                    '"' => {
                        self.replace_state(ParseState::IdentifierOrUnion);
                        self.state_stack.push(ParseState::DoubleQuotedString);
                        self.advance();
                    }
                    ':' => {
                        self.replace_state(ParseState::IndexOrSliceOrUnion);
                    }
                    '-' | '0'..='9' => {
                        self.replace_state(ParseState::IndexOrSliceOrUnion);
                        self.state_stack.push(ParseState::Integer);
                    }
                    '$' => {
                        let id = self.next_selector_id();
                        self.push_token(Token::BeginUnion)?;
                        self.push_token(Token::Root)?;
                        self.push_token(Token::Selector(Box::new(Selector::Root {
                            id,
                            tail: None,
                        })))?;
                        self.replace_state(ParseState::UnionExpression);
                        self.state_stack.push(ParseState::PathRhs);
                        self.advance();
                    }
                    '@' => {
                        self.push_token(Token::BeginUnion)?;
                        self.push_token(Token::Current)?;
                        self.push_token(Token::Selector(Box::new(Selector::current_node())))?;
                        self.replace_state(ParseState::UnionExpression);
                        self.state_stack.push(ParseState::PathRhs);
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedBracketSpecifierOrUnion)),
                },

                ParseState::UnionElement => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ':' => {
                        self.replace_state(ParseState::IndexOrSlice);
                    }
                    '-' | '0'..='9' => {
                        self.replace_state(ParseState::IndexOrSlice);
                        self.state_stack.push(ParseState::Integer);
                    }
                    '(' => {
                        self.push_token(Token::BeginExpression)?;
                        self.push_token(Token::LParen)?;
                        self.replace_state(ParseState::Expression);
                        self.state_stack.push(ParseState::ExpressionRhs);
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        if let Some(depth) = self.paren_depth.last_mut() {
                            *depth += 1;
                        }
                        self.advance();
                    }
                    '?' => {
                        self.push_token(Token::BeginFilter)?;
                        self.replace_state(ParseState::FilterExpression);
                        self.state_stack.push(ParseState::ExpressionRhs);
                        self.state_stack.push(ParseState::PathOrValueOrFunction);
                        self.advance();
                    }
                    '*' => {
                        self.push_token(Token::Selector(Box::new(Selector::Wildcard {
                            tail: None,
                        })))?;
                        self.replace_state(ParseState::PathRhs);
                        self.advance();
                    }
                    '$' => {
                        let id = self.next_selector_id();
                        self.push_token(Token::Root)?;
                        self.push_token(Token::Selector(Box::new(Selector::Root {
                            id,
                            tail: None,
                        })))?;
                        self.replace_state(ParseState::PathRhs);
                        self.advance();
                    }
                    '@' => {
                        self.push_token(Token::Current)?;
                        self.push_token(Token::Selector(Box::new(Selector::current_node())))?;
                        self.replace_state(ParseState::PathRhs);
                        self.advance();
                    }
                    '\'' => {
                        self.replace_state(ParseState::Identifier);
                        self.state_stack.push(ParseState::SingleQuotedString);
                        self.advance();
                    }
                    '"' => {
                        self.replace_state(ParseState::Identifier);
                        self.state_stack.push(ParseState::DoubleQuotedString);
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedBracketSpecifierOrUnion)),
                },

                ParseState::Integer => match c {
                    '-' => {
                        self.buffer.push(c);
                        self.replace_state(ParseState::Digit);
                        self.advance();
                    }
                    _ => self.replace_state(ParseState::Digit),
                },

                ParseState::Digit => match c {
                    '0'..='9' => {
                        self.buffer.push(c);
                        self.advance();
                    }
                    _ => {
                        self.state_stack.pop();
                    }
                },

                ParseState::IndexOrSliceOrUnion => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ']' => {
                        let index = self.parse_buffer_integer()?;
                        self.push_token(Token::Selector(Box::new(Selector::Index {
                            index,
                            tail: None,
                        })))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    ',' => {
                        self.push_token(Token::BeginUnion)?;
                        let index = self.parse_buffer_integer()?;
                        self.push_token(Token::Selector(Box::new(Selector::Index {
                            index,
                            tail: None,
                        })))?;
                        self.push_token(Token::Separator)?;
                        self.replace_state(ParseState::UnionExpression);
                        self.state_stack.push(ParseState::UnionElement);
                        self.advance();
                    }
                    ':' => {
                        if !self.buffer.is_empty() {
                            let start = self.parse_buffer_integer()?;
                            self.slice.start = Some(start);
                        }
                        self.push_token(Token::BeginUnion)?;
                        self.replace_state(ParseState::UnionExpression);
                        self.state_stack.push(ParseState::SliceExpressionStop);
                        self.state_stack.push(ParseState::Integer);
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedRightBracket)),
                },

                ParseState::IndexOrSlice => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ',' | ']' => {
                        let index = self.parse_buffer_integer()?;
                        self.push_token(Token::Selector(Box::new(Selector::Index {
                            index,
                            tail: None,
                        })))?;
                        self.state_stack.pop();
                    }
                    ':' => {
                        if !self.buffer.is_empty() {
                            let start = self.parse_buffer_integer()?;
                            self.slice.start = Some(start);
                        }
                        self.replace_state(ParseState::SliceExpressionStop);
                        self.state_stack.push(ParseState::Integer);
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedRightBracket)),
                },

                ParseState::SliceExpressionStop => {
                    if !self.buffer.is_empty() {
                        let stop = self.parse_buffer_integer()?;
                        self.slice.stop = Some(stop);
                    }
                    match c {
                        ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                        ']' | ',' => {
                            let slice = std::mem::take(&mut self.slice);
                            self.push_token(Token::Selector(Box::new(Selector::Slice {
                                slice,
                                tail: None,
                            })))?;
                            self.state_stack.pop();
                        }
                        ':' => {
                            self.replace_state(ParseState::SliceExpressionStep);
                            self.state_stack.push(ParseState::Integer);
                            self.advance();
                        }
                        _ => return Err(self.err(ErrorKind::ExpectedRightBracket)),
                    }
                }

                ParseState::SliceExpressionStep => {
                    if !self.buffer.is_empty() {
                        let step = self.parse_buffer_integer()?;
                        if step == 0 {
                            return Err(self.err(ErrorKind::StepCannotBeZero));
                        }
                        self.slice.step = Some(step);
                    }
                    match c {
                        ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                        ']' | ',' => {
                            let slice = std::mem::take(&mut self.slice);
                            self.push_token(Token::Selector(Box::new(Selector::Slice {
                                slice,
                                tail: None,
                            })))?;
                            self.state_stack.pop();
                        }
                        _ => return Err(self.err(ErrorKind::ExpectedRightBracket)),
                    }
                }

                ParseState::UnionExpression => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    '.' => {
                        self.state_stack.push(ParseState::PathExpression);
                        self.advance();
                    }
                    '[' => {
                        self.state_stack.push(ParseState::BracketSpecifierOrUnion);
                        self.advance();
                    }
                    ',' => {
                        self.push_token(Token::Separator)?;
                        self.state_stack.push(ParseState::UnionElement);
                        self.advance();
                    }
                    ']' => {
                        self.push_token(Token::EndUnion)?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedRightBracket)),
                },

                ParseState::IdentifierOrUnion => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ']' => {
                        let name = std::mem::take(&mut self.buffer);
                        self.push_token(Token::Selector(Box::new(Selector::Identifier {
                            name,
                            tail: None,
                        })))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    ',' => {
                        self.push_token(Token::BeginUnion)?;
                        let name = std::mem::take(&mut self.buffer);
                        self.push_token(Token::Selector(Box::new(Selector::Identifier {
                            name,
                            tail: None,
                        })))?;
                        self.push_token(Token::Separator)?;
                        self.replace_state(ParseState::UnionExpression);
                        self.state_stack.push(ParseState::UnionElement);
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedRightBracket)),
                },

                ParseState::WildcardOrUnion => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ']' => {
                        self.push_token(Token::Selector(Box::new(Selector::Wildcard {
                            tail: None,
                        })))?;
                        self.state_stack.pop();
                        self.advance();
                    }
                    ',' => {
                        self.push_token(Token::BeginUnion)?;
                        self.push_token(Token::Selector(Box::new(Selector::Wildcard {
                            tail: None,
                        })))?;
                        self.push_token(Token::Separator)?;
                        self.replace_state(ParseState::UnionExpression);
                        self.state_stack.push(ParseState::UnionElement);
                        self.advance();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedRightBracket)),
                },

                ParseState::FilterExpression => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ',' | ']' => {
                        self.push_token(Token::EndFilter)?;
                        self.state_stack.pop();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedCommaOrRightBracket)),
                },

                ParseState::Expression => match c {
                    ' ' | '\t' | '\r' | '\n' => self.skip_whitespace(),
                    ',' | ']' => {
                        self.push_token(Token::EndIndexExpression)?;
                        self.state_stack.pop();
                    }
                    _ => return Err(self.err(ErrorKind::ExpectedCommaOrRightBracket)),
                },
            }
        }

        self.finish()
    }

    /// `)` in path/expression position: close a pending plain paren in the
    /// current context, or hand control back to the enclosing state.
    fn close_paren_or_pop(&mut self) -> JsonPathResult<()> {
        let Some(depth) = self.paren_depth.last_mut() else {
            return Err(self.err(ErrorKind::UnbalancedParentheses));
        };
        if *depth > 0 {
            *depth -= 1;
            self.advance();
            self.push_token(Token::RParen)?;
        } else {
            self.state_stack.pop();
        }
        Ok(())
    }

    /// End-of-input handling: materialize a trailing identifier or index,
    /// then check that nothing was left half-open.
    fn finish(mut self) -> JsonPathResult<Box<Selector>> {
        if self.state_stack.is_empty() {
            return Err(self.err(ErrorKind::SyntaxError));
        }
        if self.state_stack.last() == Some(&ParseState::Start) {
            return Err(self.err(ErrorKind::UnexpectedEof));
        }

        if self.state_stack.len() >= 3 {
            match self.state_stack.last() {
                Some(ParseState::UnquotedString) | Some(ParseState::Identifier) => {
                    let name = std::mem::take(&mut self.buffer);
                    self.push_token(Token::Selector(Box::new(Selector::Identifier {
                        name,
                        tail: None,
                    })))?;
                    self.state_stack.pop();
                    if self.state_stack.last() == Some(&ParseState::IdentifierOrFunctionExpr) {
                        self.state_stack.pop();
                    }
                }
                Some(ParseState::Digit) => {
                    let index = self.parse_buffer_integer()?;
                    self.push_token(Token::Selector(Box::new(Selector::Index {
                        index,
                        tail: None,
                    })))?;
                    self.state_stack.pop();
                }
                _ => {}
            }
        }

        if self.state_stack.len() > 2 {
            return Err(self.err(ErrorKind::UnexpectedEof));
        }
        if self.paren_depth.len() != 1 || self.paren_depth[0] != 0 {
            return Err(self.err(ErrorKind::UnbalancedParentheses));
        }
        if self.output_stack.is_empty() || !self.operator_stack.is_empty() {
            return Err(self.err(ErrorKind::UnexpectedEof));
        }

        tracing::trace!(
            target: "jpq::compiler",
            tokens = self.output_stack.len(),
            subqueries = self.selector_id,
            "compilation finished"
        );

        match self.output_stack.pop() {
            Some(Token::Selector(selector)) => Ok(selector),
            // a bare `$` compiles to a current-node forwarder over the root
            Some(Token::Root) => Ok(Box::new(Selector::current_node())),
            _ => Err(self.err(ErrorKind::UnexpectedEof)),
        }
    }

    /// Pops pending operators into the output until the matching `(`.
    fn unwind_rparen(&mut self) -> JsonPathResult<()> {
        loop {
            match self.operator_stack.pop() {
                Some(Token::LParen) => return Ok(()),
                Some(token) => self.output_stack.push(token),
                None => return Err(self.err(ErrorKind::UnbalancedParentheses)),
            }
        }
    }

    /// Splits off the output-stack span above the most recent `marker`
    /// token and removes the marker itself.
    fn fold_span(
        &mut self,
        matches_marker: fn(&Token) -> bool,
    ) -> JsonPathResult<Vec<Token>> {
        let position = self
            .output_stack
            .iter()
            .rposition(matches_marker)
            .ok_or_else(|| self.err(ErrorKind::UnbalancedParentheses))?;
        let span = self.output_stack.split_off(position + 1);
        self.output_stack.pop();
        Ok(span)
    }

    /// Appends `selector` to the output-top path chain, or pushes it as a
    /// new chain when the top is not a path.
    fn push_selector(&mut self, selector: Box<Selector>) {
        match self.output_stack.last_mut() {
            Some(Token::Selector(top)) => top.append_selector(selector),
            _ => self.output_stack.push(Token::Selector(selector)),
        }
    }

    /// Routes one token into the output or operator stack, folding
    /// structural `End*` markers into composite selectors.
    fn push_token(&mut self, token: Token) -> JsonPathResult<()> {
        match token {
            Token::BeginFilter | Token::BeginExpression => {
                self.output_stack.push(token);
                self.operator_stack.push(Token::LParen);
            }

            Token::EndFilter => {
                self.unwind_rparen()?;
                let span = self.fold_span(|t| matches!(t, Token::BeginFilter))?;
                self.push_selector(Box::new(Selector::Filter {
                    expr: Expression::new(span),
                    tail: None,
                }));
            }

            Token::EndIndexExpression => {
                self.unwind_rparen()?;
                let span = self.fold_span(|t| matches!(t, Token::BeginExpression))?;
                self.push_selector(Box::new(Selector::IndexExpression {
                    expr: Expression::new(span),
                    tail: None,
                }));
            }

            Token::EndArgumentExpression => {
                self.unwind_rparen()?;
                let span = self.fold_span(|t| matches!(t, Token::BeginExpression))?;
                self.output_stack
                    .push(Token::Expression(Expression::new(span)));
            }

            Token::EndFunction => {
                self.unwind_rparen()?;
                let position = self
                    .output_stack
                    .iter()
                    .rposition(|t| matches!(t, Token::Function(_)))
                    .ok_or_else(|| self.err(ErrorKind::UnbalancedParentheses))?;
                let mut program = self.output_stack.split_off(position + 1);
                let function = match self.output_stack.pop() {
                    Some(Token::Function(handle)) => handle,
                    _ => return Err(self.err(ErrorKind::UnbalancedParentheses)),
                };
                let arg_count = program
                    .iter()
                    .filter(|t| matches!(t, Token::Argument))
                    .count();
                if let Some(arity) = function.arity() {
                    if arity != arg_count {
                        return Err(self.err(ErrorKind::InvalidArity));
                    }
                }
                program.push(Token::Function(function));
                self.push_selector(Box::new(Selector::FunctionResult {
                    expr: Expression::new(program),
                    tail: None,
                }));
            }

            Token::EndUnion => {
                let span = self.fold_span(|t| matches!(t, Token::BeginUnion))?;
                let mut branches: Vec<Selector> = Vec::new();
                let mut pending: Option<Box<Selector>> = None;
                for item in span {
                    match item {
                        Token::Separator => {
                            if let Some(branch) = pending.take() {
                                branches.push(*branch);
                            }
                        }
                        Token::Selector(selector) => {
                            pending = Some(selector);
                        }
                        _ => {}
                    }
                }
                if let Some(branch) = pending.take() {
                    branches.push(*branch);
                }
                if branches.is_empty() {
                    return Err(self.err(ErrorKind::ExpectedBracketSpecifierOrUnion));
                }
                self.push_selector(Box::new(Selector::Union {
                    branches,
                    tail: None,
                }));
            }

            Token::Selector(selector) => {
                self.push_selector(selector);
            }

            Token::LParen => {
                self.operator_stack.push(token);
            }

            Token::RParen => {
                self.unwind_rparen()?;
            }

            Token::Literal(value) => {
                // a literal replaces an immediately preceding bare anchor
                if matches!(
                    self.output_stack.last(),
                    Some(Token::Root) | Some(Token::Current)
                ) {
                    self.output_stack.pop();
                }
                self.output_stack.push(Token::Literal(value));
            }

            Token::Function(_) => {
                self.output_stack.push(token);
                self.operator_stack.push(Token::LParen);
            }

            Token::Unary(_) | Token::Binary(_) => {
                let precedence = token.precedence();
                let right_associative = token.is_right_associative();
                while let Some(top) = self.operator_stack.last() {
                    let pops = top.is_operator()
                        && (precedence > top.precedence()
                            || (precedence == top.precedence() && !right_associative));
                    if !pops {
                        break;
                    }
                    if let Some(popped) = self.operator_stack.pop() {
                        self.output_stack.push(popped);
                    }
                }
                self.operator_stack.push(token);
            }

            Token::Root
            | Token::Current
            | Token::Argument
            | Token::Separator
            | Token::BeginUnion
            | Token::Expression(_) => {
                self.output_stack.push(token);
            }
        }
        Ok(())
    }
}
