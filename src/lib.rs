//! Trifle - an interpreter runtime for a small Lisp
//!
//! This crate provides the lexer, parser, value model and a trampolined evaluator
//! for Trifle, a small Lisp with macros, closures, an exact numeric tower and
//! first-class typed exceptions.
//!
//! ```text
//! (set-symbol! (quote square) (lambda (x) (* x x)))
//! (square 1/3)                                ; 1/9
//! (try (/ 1 0) :catch division-by-zero e (message e))
//! ```
//!
//! ## Trampolined evaluation
//!
//! The evaluator never recurses on the host stack to evaluate a sub-expression.
//! Every pending evaluation is a frame on an explicit stack, and special forms
//! are resumable state machines advanced one step at a time. User recursion is
//! therefore bounded only by [`MAX_STACK_DEPTH`] (or the depth configured in
//! [`evaluator::EvalConfig`]), and running past it raises the catchable
//! `stack-overflow` exception instead of crashing the host.
//!
//! ## Exceptions are values
//!
//! Built-in functions never panic on bad input. They return an [`Error`], and
//! language-level exceptions travel down the explicit stack until a matching
//! `try` frame intercepts them. An exception nobody catches is handed back to
//! the host as [`Error::Exception`].
//!
//! ## Modules
//!
//! - `ast`: the [`ast::Value`] type, equality and textual representation
//! - `number`: the integer / rational / float coercion tower
//! - `exception`: exception types and instances
//! - `lexer` and `parser`: source text to expressions
//! - `evaluator`: environments, the trampoline and special forms
//! - `builtinops`: the built-in function registry

use std::fmt;
use std::rc::Rc;

use crate::exception::{
    DIVISION_BY_ZERO, Exception, ExceptionType, LEX_FAILED, NO_SUCH_VARIABLE, PARSE_FAILED,
    VALUE_ERROR, WRONG_ARGUMENT_NUMBER, WRONG_TYPE,
};

/// Maximum nesting of lists and hashmaps accepted by the parser
pub const MAX_PARSE_DEPTH: usize = 512;

/// Default number of frames the evaluator stack may hold before raising
/// `stack-overflow`
pub const MAX_STACK_DEPTH: usize = 10_000;

/// Maximum nesting `quote` will copy. Self-referential lists hit this limit
/// instead of looping forever.
pub const MAX_QUOTE_DEPTH: usize = 512;

/// Nesting after which the printed representation is elided with `...`
pub const MAX_REPR_DEPTH: usize = 256;

/// Error type shared by the lexer, parser, built-ins and evaluator
#[derive(Debug, Clone)]
pub enum Error {
    /// A Trifle exception. Inside the evaluator it unwinds to the nearest
    /// matching `try`; returned to the host it means nothing caught it.
    Exception(Rc<Exception>),
    /// `exit!` was called with this status code. Never catchable.
    Exit(i32),
}

impl Error {
    /// Raise a fresh exception of the given type
    pub fn raise(exception_type: &'static ExceptionType, message: impl Into<String>) -> Self {
        Error::Exception(Rc::new(Exception::new(exception_type, message)))
    }

    pub fn wrong_type(message: impl Into<String>) -> Self {
        Self::raise(&WRONG_TYPE, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::raise(&VALUE_ERROR, message)
    }

    pub fn division_by_zero() -> Self {
        Self::raise(&DIVISION_BY_ZERO, "Divided by zero")
    }

    pub fn no_such_variable(name: &str) -> Self {
        Self::raise(&NO_SUCH_VARIABLE, format!("No such variable defined: '{name}'"))
    }

    pub fn lex_failed(message: impl Into<String>) -> Self {
        Self::raise(&LEX_FAILED, message)
    }

    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::raise(&PARSE_FAILED, message)
    }

    /// Create an arity error for a call that needed exactly `expected` arguments
    pub fn arity_error(name: &str, expected: usize, got: usize) -> Self {
        Self::raise(
            &WRONG_ARGUMENT_NUMBER,
            format!(
                "{name} takes {expected} argument{}, but got {got}",
                plural(expected)
            ),
        )
    }

    /// Create an arity error for a call that needed at least `minimum` arguments
    pub fn min_arity_error(name: &str, minimum: usize, got: usize) -> Self {
        Self::raise(
            &WRONG_ARGUMENT_NUMBER,
            format!(
                "{name} takes at least {minimum} argument{}, but got {got}",
                plural(minimum)
            ),
        )
    }

    /// The exception carried by this error, if it is one
    pub fn exception(&self) -> Option<&Rc<Exception>> {
        match self {
            Error::Exception(exception) => Some(exception),
            Error::Exit(_) => None,
        }
    }

    /// Name of the exception type, for assertions and reporting
    pub fn type_name(&self) -> Option<&'static str> {
        self.exception().map(|exception| exception.exception_type().name)
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Exception(exception) => write!(
                f,
                "Uncaught exception {}: {}",
                exception.exception_type().name,
                exception.message()
            ),
            Error::Exit(code) => write!(f, "Exited with status {code}"),
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod exception;
pub mod lexer;
pub mod number;
pub mod parser;
