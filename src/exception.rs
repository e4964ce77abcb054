//! Exception types and exception instances.
//!
//! Exception types form a single-inheritance tree rooted at `error`. Each type
//! is a static descriptor with a link to its parent, so catch matching is an
//! ancestor walk and type identity is pointer identity.
//!
//! An [`Exception`] is a first-class value. Its `caught` flag starts false and
//! is flipped in place when a `try` frame intercepts it; after that the
//! instance is ordinary data and is never intercepted again.

use std::cell::Cell;
use std::fmt;

/// Descriptor for one node in the exception type tree
pub struct ExceptionType {
    pub name: &'static str,
    pub parent: Option<&'static ExceptionType>,
}

impl ExceptionType {
    /// Iterate over this type and all its ancestors, innermost first
    pub fn ancestors(&'static self) -> impl Iterator<Item = &'static ExceptionType> {
        std::iter::successors(Some(self), |current| current.parent)
    }

    /// Whether a `try` declaring `catch_type` intercepts exceptions of this type
    pub fn is_subtype_of(&'static self, catch_type: &ExceptionType) -> bool {
        self.ancestors().any(|ancestor| ancestor == catch_type)
    }
}

impl PartialEq for ExceptionType {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExceptionType({})", self.name)
    }
}

macro_rules! exception_type {
    ($ident:ident, $name:literal) => {
        pub static $ident: ExceptionType = ExceptionType {
            name: $name,
            parent: Some(&ERROR),
        };
    };
}

/// Root of the tree: `(try ... :catch error e ...)` catches everything
pub static ERROR: ExceptionType = ExceptionType {
    name: "error",
    parent: None,
};

exception_type!(STACK_OVERFLOW, "stack-overflow");
exception_type!(NO_SUCH_VARIABLE, "no-such-variable");
exception_type!(PARSE_FAILED, "parse-failed");
exception_type!(LEX_FAILED, "lex-failed");
exception_type!(VALUE_ERROR, "value-error");
exception_type!(WRONG_TYPE, "wrong-type");
exception_type!(WRONG_ARGUMENT_NUMBER, "wrong-argument-number");
exception_type!(DIVISION_BY_ZERO, "division-by-zero");
exception_type!(FILE_NOT_FOUND, "file-not-found");
exception_type!(CHANGING_CLOSED_HANDLE, "changing-closed-handle");
exception_type!(MISSING_KEY, "missing-key");

/// Every built-in exception type, bound by name in a fresh global environment
pub static BUILTIN_EXCEPTION_TYPES: [&ExceptionType; 12] = [
    &ERROR,
    &STACK_OVERFLOW,
    &NO_SUCH_VARIABLE,
    &PARSE_FAILED,
    &LEX_FAILED,
    &VALUE_ERROR,
    &WRONG_TYPE,
    &WRONG_ARGUMENT_NUMBER,
    &DIVISION_BY_ZERO,
    &FILE_NOT_FOUND,
    &CHANGING_CLOSED_HANDLE,
    &MISSING_KEY,
];

/// A raised (or previously raised) exception
pub struct Exception {
    exception_type: &'static ExceptionType,
    message: String,
    caught: Cell<bool>,
}

impl Exception {
    pub fn new(exception_type: &'static ExceptionType, message: impl Into<String>) -> Self {
        Exception {
            exception_type,
            message: message.into(),
            caught: Cell::new(false),
        }
    }

    pub fn exception_type(&self) -> &'static ExceptionType {
        self.exception_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_caught(&self) -> bool {
        self.caught.get()
    }

    /// Record that a `try` intercepted this exception. There is no way back.
    pub(crate) fn mark_caught(&self) {
        self.caught.set(true);
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Exception({}, {:?}, caught={})",
            self.exception_type.name,
            self.message,
            self.caught.get()
        )
    }
}
