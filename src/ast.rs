//! This module defines [`Value`], the closed tagged union of every runtime value
//! in the interpreter, together with the pieces of the value model that are not
//! evaluation: structural equality (`equal?`), identity (`same?`), hashmap keys,
//! lambda/macro parameter lists and the canonical textual representation.
//!
//! Mutable containers (strings, bytestrings, lists, hashmaps, file handles) are
//! shared handles: cloning a `Value` clones the handle, so every binding to "the
//! same list" observes mutations made through any other. Everything else is
//! immutable and cloned by value.
//!
//! Ergonomic helper functions such as [`val`], [`sym`], [`kw`] and [`nil`] are
//! provided for building expressions in code and tests.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::builtinops::BuiltinOp;
use crate::builtinops::io::FileHandle;
use crate::evaluator::Environment;
use crate::evaluator::special_forms::SpecialForm;
use crate::exception::{Exception, ExceptionType};
use crate::number::{self, Rational};
use crate::{Error, MAX_REPR_DEPTH};

/// Shared, mutable storage used by every aliasing container
pub type Shared<T> = Rc<RefCell<T>>;

/// Hashmap contents, kept in insertion order
pub type Entries = IndexMap<HashKey, Value>;

/// Core value type of the interpreter
///
/// Expressions are values too: the parser produces lists, hashmaps and atoms,
/// and the evaluator consumes them directly.
#[derive(Clone)]
pub enum Value {
    Boolean(bool),
    Null,
    /// Arbitrary precision integer
    Integer(BigInt),
    /// Always in lowest terms and never with denominator 1
    Rational(Rational),
    Float(f64),
    Symbol(String),
    /// Written `:name` in source, stored without the colon
    Keyword(String),
    Character(char),
    String(Shared<Vec<char>>),
    Bytestring(Shared<Vec<u8>>),
    List(Shared<ListItems>),
    Hashmap(Shared<Entries>),
    FileHandle(Shared<FileHandle>),
    Lambda(Rc<Lambda>),
    Macro(Rc<Macro>),
    /// Built-in function from the static registry
    Function(&'static BuiltinOp),
    SpecialForm(SpecialForm),
    ExceptionType(&'static ExceptionType),
    Exception(Rc<Exception>),
}

/// The items of a list
///
/// Dropping releases nested lists and hashmaps iteratively, so a long chain of
/// nested lists does not exhaust the host stack.
#[derive(Clone, Default, PartialEq)]
pub struct ListItems(Vec<Value>);

impl Deref for ListItems {
    type Target = Vec<Value>;

    fn deref(&self) -> &Vec<Value> {
        &self.0
    }
}

impl DerefMut for ListItems {
    fn deref_mut(&mut self) -> &mut Vec<Value> {
        &mut self.0
    }
}

impl Drop for ListItems {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.0);
        while let Some(value) = pending.pop() {
            match value {
                Value::List(items) => {
                    if let Ok(cell) = Rc::try_unwrap(items) {
                        pending.append(&mut cell.into_inner().0);
                    }
                }
                Value::Hashmap(entries) => {
                    if let Ok(cell) = Rc::try_unwrap(entries) {
                        pending.extend(cell.into_inner().into_values());
                    }
                }
                _ => {}
            }
        }
    }
}

/// A user-defined function closing over its defining environment
pub struct Lambda {
    pub parameters: Parameters,
    pub body: Vec<Value>,
    pub environment: Environment,
}

/// A user-defined macro. Its body runs in the global scope only.
pub struct Macro {
    pub name: String,
    pub parameters: Parameters,
    pub body: Vec<Value>,
}

/// A validated parameter list: leading names plus an optional `:rest` name
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    names: Vec<String>,
    rest: Option<String>,
}

impl Parameters {
    /// Validate the parameter list of a `lambda` or `macro` form
    pub fn parse(form: &str, list: &Value) -> Result<Parameters, Error> {
        let Value::List(items) = list else {
            return Err(Error::wrong_type(format!(
                "{form} parameters should be a list, but got: {list}"
            )));
        };
        let items = items.borrow();

        let mut names: Vec<String> = Vec::new();
        let mut rest = None;
        let mut index = 0;
        while index < items.len() {
            let name = match &items[index] {
                Value::Symbol(name) => name.clone(),
                Value::Keyword(keyword) if keyword == "rest" => {
                    match items.get(index + 1) {
                        Some(Value::Symbol(name)) if index + 2 == items.len() => {
                            if names.contains(name) {
                                return Err(Error::value_error(format!(
                                    "Repeated parameter name: {name}"
                                )));
                            }
                            rest = Some(name.clone());
                            break;
                        }
                        _ => {
                            return Err(Error::value_error(format!(
                                ":rest must be followed by exactly one symbol in {list}"
                            )));
                        }
                    }
                }
                other => {
                    return Err(Error::wrong_type(format!(
                        "{form} parameters should be symbols, but got: {other}"
                    )));
                }
            };
            if names.contains(&name) {
                return Err(Error::value_error(format!(
                    "Repeated parameter name: {name}"
                )));
            }
            names.push(name);
            index += 1;
        }

        Ok(Parameters { names, rest })
    }

    /// Pair parameter names with supplied arguments, collecting any extra
    /// arguments into a fresh list for the `:rest` name
    pub fn bind(&self, callee: &str, args: Vec<Value>) -> Result<Vec<(String, Value)>, Error> {
        match &self.rest {
            None if args.len() != self.names.len() => {
                return Err(Error::arity_error(callee, self.names.len(), args.len()));
            }
            Some(_) if args.len() < self.names.len() => {
                return Err(Error::min_arity_error(
                    callee,
                    self.names.len(),
                    args.len(),
                ));
            }
            _ => {}
        }

        let mut args = args.into_iter();
        let mut bindings: Vec<(String, Value)> = self
            .names
            .iter()
            .cloned()
            .zip(args.by_ref())
            .collect();
        if let Some(rest) = &self.rest {
            bindings.push((rest.clone(), Value::list(args.collect())));
        }
        Ok(bindings)
    }
}

/// The subset of values usable as hashmap keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Boolean(bool),
    Null,
    Integer(BigInt),
    Rational(Rational),
    Symbol(String),
    Keyword(String),
    Character(char),
}

impl TryFrom<&Value> for HashKey {
    type Error = Error;

    fn try_from(value: &Value) -> Result<HashKey, Error> {
        match value {
            Value::Boolean(b) => Ok(HashKey::Boolean(*b)),
            Value::Null => Ok(HashKey::Null),
            Value::Integer(i) => Ok(HashKey::Integer(i.clone())),
            Value::Rational(r) => Ok(HashKey::Rational(r.clone())),
            Value::Symbol(s) => Ok(HashKey::Symbol(s.clone())),
            Value::Keyword(k) => Ok(HashKey::Keyword(k.clone())),
            Value::Character(c) => Ok(HashKey::Character(*c)),
            other => Err(Error::wrong_type(format!(
                "Hashmap keys must be immutable atoms, but got: {other}"
            ))),
        }
    }
}

impl From<HashKey> for Value {
    fn from(key: HashKey) -> Self {
        match key {
            HashKey::Boolean(b) => Value::Boolean(b),
            HashKey::Null => Value::Null,
            HashKey::Integer(i) => Value::Integer(i),
            HashKey::Rational(r) => Value::Rational(r),
            HashKey::Symbol(s) => Value::Symbol(s),
            HashKey::Keyword(k) => Value::Keyword(k),
            HashKey::Character(c) => Value::Character(c),
        }
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(ListItems(items))))
    }

    pub fn string(text: &str) -> Value {
        Value::String(Rc::new(RefCell::new(text.chars().collect())))
    }

    pub fn bytestring(bytes: Vec<u8>) -> Value {
        Value::Bytestring(Rc::new(RefCell::new(bytes)))
    }

    pub fn hashmap(entries: Entries) -> Value {
        Value::Hashmap(Rc::new(RefCell::new(entries)))
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Integer(_) | Value::Rational(_) | Value::Float(_)
        )
    }

    /// Whether this value is the given symbol
    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, Value::Symbol(s) if s == name)
    }

    /// Whether this value is the given keyword
    pub fn is_keyword(&self, name: &str) -> bool {
        matches!(self, Value::Keyword(k) if k == name)
    }

    /// `same?`: identity for reference values, value equality for atoms
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Bytestring(a), Value::Bytestring(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Hashmap(a), Value::Hashmap(b)) => Rc::ptr_eq(a, b),
            (Value::FileHandle(a), Value::FileHandle(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Macro(a), Value::Macro(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Rational(a), Value::Rational(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(_) | Value::Rational(_) | Value::Float(_), _) => false,
            _ => self == other,
        }
    }

    /// Text for `printable`: strings as their raw characters, everything else
    /// as its representation
    pub fn printable(&self) -> String {
        match self {
            Value::String(chars) => chars.borrow().iter().collect(),
            other => other.to_string(),
        }
    }

    /// Variant name, used by `Debug`
    fn kind_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "Boolean",
            Value::Null => "Null",
            Value::Integer(_) => "Integer",
            Value::Rational(_) => "Rational",
            Value::Float(_) => "Float",
            Value::Symbol(_) => "Symbol",
            Value::Keyword(_) => "Keyword",
            Value::Character(_) => "Character",
            Value::String(_) => "String",
            Value::Bytestring(_) => "Bytestring",
            Value::List(_) => "List",
            Value::Hashmap(_) => "Hashmap",
            Value::FileHandle(_) => "FileHandle",
            Value::Lambda(_) => "Lambda",
            Value::Macro(_) => "Macro",
            Value::Function(_) => "Function",
            Value::SpecialForm(_) => "SpecialForm",
            Value::ExceptionType(_) => "ExceptionType",
            Value::Exception(_) => "Exception",
        }
    }

    fn write_repr(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if depth > MAX_REPR_DEPTH {
            return write!(f, "...");
        }
        match self {
            Value::Boolean(true) => write!(f, "#true"),
            Value::Boolean(false) => write!(f, "#false"),
            Value::Null => write!(f, "#null"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Rational(r) => write!(f, "{r}"),
            Value::Float(x) => write!(f, "{}", number::format_float(*x)),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Keyword(k) => write!(f, ":{k}"),
            Value::Character(c) => match c {
                '\n' => write!(f, "'\\n'"),
                '\'' => write!(f, "'\\''"),
                '\\' => write!(f, "'\\\\'"),
                c => write!(f, "'{c}'"),
            },
            Value::String(chars) => {
                write!(f, "\"")?;
                for ch in chars.borrow().iter() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bytestring(bytes) => {
                write!(f, "#bytes(\"")?;
                for byte in bytes.borrow().iter() {
                    match byte {
                        b'"' | b'\\' => write!(f, "\\x{byte:02x}")?,
                        0x20..=0x7e => write!(f, "{}", char::from(*byte))?,
                        _ => write!(f, "\\x{byte:02x}")?,
                    }
                }
                write!(f, "\")")
            }
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    item.write_repr(f, depth + 1)?;
                }
                write!(f, ")")
            }
            Value::Hashmap(entries) => {
                let entries = entries.borrow();
                let mut sorted: Vec<(String, &Value)> = entries
                    .iter()
                    .map(|(key, value)| (Value::from(key.clone()).to_string(), value))
                    .collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));

                write!(f, "{{")?;
                for (i, (key, value)) in sorted.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key} ")?;
                    value.write_repr(f, depth + 1)?;
                }
                write!(f, "}}")
            }
            Value::FileHandle(handle) => write!(f, "<file handle \"{}\">", handle.borrow().path()),
            Value::Lambda(_) => write!(f, "<lambda>"),
            Value::Macro(m) => write!(f, "<macro {}>", m.name),
            Value::Function(op) => write!(f, "<built-in function {}>", op.name),
            Value::SpecialForm(form) => write!(f, "<special form {}>", form.name()),
            Value::ExceptionType(t) => write!(f, "<exception type {}>", t.name),
            Value::Exception(e) => {
                write!(f, "<exception {}: ", e.exception_type().name)?;
                Value::string(e.message()).write_repr(f, depth + 1)?;
                write!(f, ">")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_repr(f, 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({self})", self.kind_name())
    }
}

/// Structural equality, as used by `equal?`
///
/// Numbers compare numerically across kinds. Containers compare by contents,
/// callables and handles by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if let Some(equal) = number::numeric_eq(self, other) {
            return equal;
        }
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Character(a), Value::Character(b)) => a == b,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Bytestring(a), Value::Bytestring(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Hashmap(a), Value::Hashmap(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::FileHandle(a), Value::FileHandle(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Macro(a), Value::Macro(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.name == b.name,
            (Value::SpecialForm(a), Value::SpecialForm(b)) => a == b,
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            _ => false,
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(&s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Character(c)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<BigInt> for Value {
    fn from(i: BigInt) -> Self {
        Value::Integer(i)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(BigInt::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);
impl_from_integer!(u64);
impl_from_integer!(usize);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating symbols
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating keywords, given without the leading colon
pub fn kw<S: AsRef<str>>(name: S) -> Value {
    Value::Keyword(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating a fresh empty list
pub fn nil() -> Value {
    Value::list(Vec::new())
}
