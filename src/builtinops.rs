//! Built-in operations registry.
//!
//! Every built-in function is defined once in a single static table together
//! with its name and arity. [`crate::evaluator::create_global_env`] binds each
//! entry by name, so built-ins are ordinary first-class values: they can be
//! passed to lambdas, stored in lists or rebound.
//!
//! ```text
//! (+ 1 2 3)                      ; arithmetic over the numeric tower
//! (equal? (quote (1)) (quote (1)))  ; structural equality
//! (call + (quote (1 2)))         ; apply a callable to a list of arguments
//! ```
//!
//! ## Functions vs Privileged Functions
//!
//! - **Functions**: receive their evaluated arguments and return a value or
//!   raise an exception (e.g. `+`, `length`, `get-key`)
//! - **Privileged functions**: additionally see the caller's environment and
//!   may ask the trampoline to evaluate a further frame whose value becomes
//!   their result (`eval`, `call`, `set-symbol!`, `defined?`)
//!
//! Special forms are not in this registry; see
//! [`crate::evaluator::special_forms`].
//!
//! ## Error Handling
//!
//! Built-ins never panic on bad input. Arity is checked by the evaluator
//! before the call using [`BuiltinOp::arity`]; argument types and values are
//! checked by each built-in, which raises `wrong-type` or `value-error`
//! naming the offending argument's representation.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the signature
//!    `fn(&[Value]) -> Result<Value, Error>` (or the privileged variant)
//! 2. **Add it to BUILTIN_OPS** with its name and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use crate::ast::{Entries, HashKey, Shared, Value};
use crate::evaluator::{Action, Environment, Frame};
use crate::exception::{Exception, MISSING_KEY, WRONG_ARGUMENT_NUMBER};
use crate::number::{self, Operands};
use crate::{Error, parser};

pub mod io;

/// Expected number of arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
}

impl Arity {
    /// Check an argument count, raising `wrong-argument-number` on mismatch
    pub fn validate(self, name: &str, count: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(expected) if count != expected => {
                Err(Error::arity_error(name, expected, count))
            }
            Arity::AtLeast(minimum) if count < minimum => {
                Err(Error::min_arity_error(name, minimum, count))
            }
            Arity::Range(minimum, maximum) if count < minimum || count > maximum => {
                Err(Error::raise(
                    &WRONG_ARGUMENT_NUMBER,
                    format!("{name} takes between {minimum} and {maximum} arguments, but got {count}"),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Represents the implementation of a built-in function
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Takes evaluated arguments and returns a value
    Function(fn(&[Value]) -> Result<Value, Error>),
    /// Also receives the caller's environment and may hand a frame back to
    /// the trampoline
    Privileged(fn(&[Value], &Environment) -> Result<Action, Error>),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::Privileged(_) => write!(f, "Privileged(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name this operation is bound to in a fresh global environment
    pub name: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

//
// Argument helpers
//

/// Destructure a fixed number of arguments. The evaluator has already checked
/// the arity; this only turns the slice into an array pattern.
pub(crate) fn fixed_args<'a, const N: usize>(
    name: &str,
    args: &'a [Value],
) -> Result<&'a [Value; N], Error> {
    args.try_into()
        .map_err(|_| Error::arity_error(name, N, args.len()))
}

fn expected(name: &str, what: &str, got: &Value) -> Error {
    Error::wrong_type(format!("{name} requires {what}, but got: {got}"))
}

fn integer_arg<'a>(name: &str, value: &'a Value) -> Result<&'a BigInt, Error> {
    match value {
        Value::Integer(integer) => Ok(integer),
        other => Err(expected(name, "an integer", other)),
    }
}

fn symbol_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str, Error> {
    match value {
        Value::Symbol(symbol) => Ok(symbol),
        other => Err(expected(name, "a symbol", other)),
    }
}

pub(crate) fn string_arg(name: &str, value: &Value) -> Result<String, Error> {
    match value {
        Value::String(chars) => Ok(chars.borrow().iter().collect()),
        other => Err(expected(name, "a string", other)),
    }
}

/// Resolve a possibly negative index against a sequence of `length` items.
/// `allow_end` admits `length` itself, for insertion.
fn resolve_index(name: &str, index: &Value, length: usize, allow_end: bool) -> Result<usize, Error> {
    let index = integer_arg(name, index)?;
    let resolved = if index.is_negative() {
        BigInt::from(length) + index
    } else {
        index.clone()
    };
    let limit = if allow_end { length + 1 } else { length };
    match resolved.to_usize() {
        Some(position) if position < limit => Ok(position),
        _ => Err(Error::value_error(format!(
            "{name}: index {index} is out of range for length {length}"
        ))),
    }
}

fn byte_arg(name: &str, value: &Value) -> Result<u8, Error> {
    let integer = integer_arg(name, value)?;
    integer.to_u8().ok_or_else(|| {
        Error::value_error(format!(
            "{name}: bytes must be between 0 and 255, but got {integer}"
        ))
    })
}

fn character_arg(name: &str, value: &Value) -> Result<char, Error> {
    match value {
        Value::Character(c) => Ok(*c),
        other => Err(expected(name, "a character", other)),
    }
}

//
// Builtin Function Implementations
//

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    number::add(Operands::coerce("+", args)?)
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    number::subtract(Operands::coerce("-", args)?)
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    number::multiply(Operands::coerce("*", args)?)
}

fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    number::divide(Operands::coerce("/", args)?)
}

fn builtin_lt(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(number::less_than(Operands::coerce("<", args)?)))
}

fn builtin_mod(args: &[Value]) -> Result<Value, Error> {
    let [dividend, divisor] = fixed_args("mod", args)?;
    number::modulo(integer_arg("mod", dividend)?, integer_arg("mod", divisor)?)
}

fn builtin_floor_div(args: &[Value]) -> Result<Value, Error> {
    let [dividend, divisor] = fixed_args("div", args)?;
    number::floor_divide(integer_arg("div", dividend)?, integer_arg("div", divisor)?)
}

fn builtin_same(args: &[Value]) -> Result<Value, Error> {
    let [first, second] = fixed_args("same?", args)?;
    Ok(Value::Boolean(first.is_same(second)))
}

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    let [first, second] = fixed_args("equal?", args)?;
    Ok(Value::Boolean(first == second))
}

fn builtin_set_symbol(args: &[Value], env: &Environment) -> Result<Action, Error> {
    let [symbol, value] = fixed_args("set-symbol!", args)?;
    env.set(symbol_arg("set-symbol!", symbol)?, value.clone());
    Ok(Action::Return(Value::Null))
}

fn builtin_defined(args: &[Value], env: &Environment) -> Result<Action, Error> {
    let [symbol] = fixed_args("defined?", args)?;
    let defined = env.contains(symbol_arg("defined?", symbol)?);
    Ok(Action::Return(Value::Boolean(defined)))
}

/// Counter behind `fresh-symbol`. Shared by every environment so that
/// symbols made for different top-level forms never collide.
static FRESH_SYMBOLS: AtomicUsize = AtomicUsize::new(0);

/// A symbol no source text can spell, since symbols cannot start with a digit
fn builtin_fresh_symbol(_args: &[Value]) -> Result<Value, Error> {
    let id = FRESH_SYMBOLS.fetch_add(1, Ordering::Relaxed) + 1;
    Ok(Value::Symbol(format!("{id}-unnamed")))
}

fn builtin_eval(args: &[Value], env: &Environment) -> Result<Action, Error> {
    let [expression] = fixed_args("eval", args)?;
    Ok(Action::Evaluate(Frame::new(expression.clone(), env.clone())))
}

fn builtin_call(args: &[Value], env: &Environment) -> Result<Action, Error> {
    let [callee, arguments] = fixed_args("call", args)?;
    if !matches!(callee, Value::Function(_) | Value::Lambda(_)) {
        return Err(expected("call", "a function or lambda", callee));
    }
    let Value::List(arguments) = arguments else {
        return Err(expected("call", "a list of arguments", arguments));
    };
    let arguments = arguments.borrow().to_vec();
    Ok(Action::Evaluate(Frame::apply(
        callee.clone(),
        arguments,
        env.clone(),
    )))
}

fn builtin_parse(args: &[Value]) -> Result<Value, Error> {
    let [source] = fixed_args("parse", args)?;
    let forms = parser::parse(&string_arg("parse", source)?)?;
    Ok(Value::list(forms))
}

fn builtin_printable(args: &[Value]) -> Result<Value, Error> {
    let [value] = fixed_args("printable", args)?;
    Ok(Value::string(&value.printable()))
}

fn builtin_exit(args: &[Value]) -> Result<Value, Error> {
    let code = match args {
        [] => 0,
        [code] => {
            let code = integer_arg("exit!", code)?;
            code.to_i32().ok_or_else(|| {
                Error::value_error(format!("exit!: status {code} is out of range"))
            })?
        }
        _ => return Err(Error::arity_error("exit!", 1, args.len())),
    };
    Err(Error::Exit(code))
}

fn builtin_encode(args: &[Value]) -> Result<Value, Error> {
    let [text] = fixed_args("encode", args)?;
    Ok(Value::bytestring(string_arg("encode", text)?.into_bytes()))
}

fn builtin_decode(args: &[Value]) -> Result<Value, Error> {
    let [bytes] = fixed_args("decode", args)?;
    let Value::Bytestring(bytes) = bytes else {
        return Err(expected("decode", "a bytestring", bytes));
    };
    let text = String::from_utf8(bytes.borrow().clone())
        .map_err(|err| Error::value_error(format!("decode: invalid UTF-8: {err}")))?;
    Ok(Value::string(&text))
}

fn builtin_throw(args: &[Value]) -> Result<Value, Error> {
    let [exception_type, message] = fixed_args("throw", args)?;
    let Value::ExceptionType(exception_type) = exception_type else {
        return Err(expected("throw", "an exception type", exception_type));
    };
    let message = string_arg("throw", message)?;
    Err(Error::Exception(Rc::new(Exception::new(exception_type, message))))
}

fn builtin_message(args: &[Value]) -> Result<Value, Error> {
    let [exception] = fixed_args("message", args)?;
    match exception {
        Value::Exception(exception) => Ok(Value::string(exception.message())),
        other => Err(expected("message", "an exception", other)),
    }
}

fn builtin_exception_type(args: &[Value]) -> Result<Value, Error> {
    let [exception] = fixed_args("exception-type", args)?;
    match exception {
        Value::Exception(exception) => Ok(Value::ExceptionType(exception.exception_type())),
        other => Err(expected("exception-type", "an exception", other)),
    }
}

fn builtin_length(args: &[Value]) -> Result<Value, Error> {
    let [sequence] = fixed_args("length", args)?;
    let length = match sequence {
        Value::List(items) => items.borrow().len(),
        Value::String(chars) => chars.borrow().len(),
        Value::Bytestring(bytes) => bytes.borrow().len(),
        Value::Hashmap(entries) => entries.borrow().len(),
        other => return Err(expected("length", "a sequence or hashmap", other)),
    };
    Ok(Value::from(length))
}

fn builtin_get_index(args: &[Value]) -> Result<Value, Error> {
    const NAME: &str = "get-index";
    let [sequence, index] = fixed_args(NAME, args)?;
    match sequence {
        Value::List(items) => {
            let items = items.borrow();
            let position = resolve_index(NAME, index, items.len(), false)?;
            Ok(items[position].clone())
        }
        Value::String(chars) => {
            let chars = chars.borrow();
            let position = resolve_index(NAME, index, chars.len(), false)?;
            Ok(Value::Character(chars[position]))
        }
        Value::Bytestring(bytes) => {
            let bytes = bytes.borrow();
            let position = resolve_index(NAME, index, bytes.len(), false)?;
            Ok(Value::from(bytes[position]))
        }
        other => Err(expected(NAME, "a list, string or bytestring", other)),
    }
}

fn builtin_set_index(args: &[Value]) -> Result<Value, Error> {
    const NAME: &str = "set-index!";
    let [sequence, index, value] = fixed_args(NAME, args)?;
    match sequence {
        Value::List(items) => {
            let length = items.borrow().len();
            let position = resolve_index(NAME, index, length, false)?;
            items.borrow_mut()[position] = value.clone();
        }
        Value::String(chars) => {
            let character = character_arg(NAME, value)?;
            let length = chars.borrow().len();
            let position = resolve_index(NAME, index, length, false)?;
            chars.borrow_mut()[position] = character;
        }
        Value::Bytestring(bytes) => {
            let byte = byte_arg(NAME, value)?;
            let length = bytes.borrow().len();
            let position = resolve_index(NAME, index, length, false)?;
            bytes.borrow_mut()[position] = byte;
        }
        other => return Err(expected(NAME, "a list, string or bytestring", other)),
    }
    Ok(Value::Null)
}

fn builtin_insert(args: &[Value]) -> Result<Value, Error> {
    const NAME: &str = "insert!";
    let [sequence, index, value] = fixed_args(NAME, args)?;
    match sequence {
        Value::List(items) => {
            let length = items.borrow().len();
            let position = resolve_index(NAME, index, length, true)?;
            items.borrow_mut().insert(position, value.clone());
        }
        Value::String(chars) => {
            let character = character_arg(NAME, value)?;
            let length = chars.borrow().len();
            let position = resolve_index(NAME, index, length, true)?;
            chars.borrow_mut().insert(position, character);
        }
        Value::Bytestring(bytes) => {
            let byte = byte_arg(NAME, value)?;
            let length = bytes.borrow().len();
            let position = resolve_index(NAME, index, length, true)?;
            bytes.borrow_mut().insert(position, byte);
        }
        other => return Err(expected(NAME, "a list, string or bytestring", other)),
    }
    Ok(Value::Null)
}

fn builtin_append(args: &[Value]) -> Result<Value, Error> {
    const NAME: &str = "append!";
    let [sequence, value] = fixed_args(NAME, args)?;
    match sequence {
        Value::List(items) => items.borrow_mut().push(value.clone()),
        Value::String(chars) => chars.borrow_mut().push(character_arg(NAME, value)?),
        Value::Bytestring(bytes) => bytes.borrow_mut().push(byte_arg(NAME, value)?),
        other => return Err(expected(NAME, "a list, string or bytestring", other)),
    }
    Ok(Value::Null)
}

fn hashmap_arg<'a>(
    name: &str,
    value: &'a Value,
) -> Result<&'a Shared<Entries>, Error> {
    match value {
        Value::Hashmap(entries) => Ok(entries),
        other => Err(expected(name, "a hashmap", other)),
    }
}

fn builtin_get_key(args: &[Value]) -> Result<Value, Error> {
    let [hashmap, key] = fixed_args("get-key", args)?;
    let entries = hashmap_arg("get-key", hashmap)?;
    let hash_key = HashKey::try_from(key)?;
    entries.borrow().get(&hash_key).cloned().ok_or_else(|| {
        Error::raise(&MISSING_KEY, format!("Key {key} not found in hashmap"))
    })
}

fn builtin_set_key(args: &[Value]) -> Result<Value, Error> {
    let [hashmap, key, value] = fixed_args("set-key!", args)?;
    let entries = hashmap_arg("set-key!", hashmap)?;
    let hash_key = HashKey::try_from(key)?;
    entries.borrow_mut().insert(hash_key, value.clone());
    Ok(Value::Null)
}

/// `(key value)` pairs, ordered by the key's representation
fn builtin_get_items(args: &[Value]) -> Result<Value, Error> {
    let [hashmap] = fixed_args("get-items", args)?;
    let entries = hashmap_arg("get-items", hashmap)?;
    let mut items: Vec<(String, Value)> = entries
        .borrow()
        .iter()
        .map(|(key, value)| {
            let key = Value::from(key.clone());
            (key.to_string(), Value::list(vec![key, value.clone()]))
        })
        .collect();
    items.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Value::list(items.into_iter().map(|(_, item)| item).collect()))
}

macro_rules! type_predicate {
    ($fn_name:ident, $name:literal, $pattern:pat) => {
        fn $fn_name(args: &[Value]) -> Result<Value, Error> {
            let [value] = fixed_args($name, args)?;
            Ok(Value::Boolean(matches!(value, $pattern)))
        }
    };
}

type_predicate!(builtin_is_symbol, "symbol?", Value::Symbol(_));
type_predicate!(builtin_is_list, "list?", Value::List(_));
type_predicate!(builtin_is_hashmap, "hashmap?", Value::Hashmap(_));
type_predicate!(builtin_is_string, "string?", Value::String(_));
type_predicate!(builtin_is_bytestring, "bytestring?", Value::Bytestring(_));
type_predicate!(builtin_is_character, "character?", Value::Character(_));

/// Global registry of all built-in operations.
///
/// The registry is a single contiguous collection of `BuiltinOp` values for
/// ease of auditing, built once on first use via a `LazyLock`.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn function(
        name: &'static str,
        arity: Arity,
        f: fn(&[Value]) -> Result<Value, Error>,
    ) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::Function(f),
            arity,
        }
    }

    fn privileged(
        name: &'static str,
        arity: Arity,
        f: fn(&[Value], &Environment) -> Result<Action, Error>,
    ) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::Privileged(f),
            arity,
        }
    }

    use Arity::{AtLeast, Exact, Range};

    vec![
        // Arithmetic operations
        function("+", AtLeast(1), builtin_add),
        function("-", AtLeast(1), builtin_sub),
        function("*", AtLeast(1), builtin_mul),
        function("/", AtLeast(2), builtin_div),
        function("mod", Exact(2), builtin_mod),
        function("div", Exact(2), builtin_floor_div),
        function("<", AtLeast(2), builtin_lt),
        // Equality
        function("same?", Exact(2), builtin_same),
        function("equal?", Exact(2), builtin_equal),
        // Environment
        privileged("set-symbol!", Exact(2), builtin_set_symbol),
        privileged("defined?", Exact(1), builtin_defined),
        function("fresh-symbol", Exact(0), builtin_fresh_symbol),
        // Evaluation
        privileged("eval", Exact(1), builtin_eval),
        privileged("call", Exact(2), builtin_call),
        function("parse", Exact(1), builtin_parse),
        // Text and process
        function("printable", Exact(1), builtin_printable),
        function("input", Exact(1), io::builtin_input),
        function("exit!", Range(0, 1), builtin_exit),
        // Files
        function("open", Exact(2), io::builtin_open),
        function("close!", Exact(1), io::builtin_close),
        function("read", Exact(1), io::builtin_read),
        function("write!", Exact(2), io::builtin_write),
        function("flush!", Exact(1), io::builtin_flush),
        // Encoding
        function("encode", Exact(1), builtin_encode),
        function("decode", Exact(1), builtin_decode),
        // Exceptions
        function("throw", Exact(2), builtin_throw),
        function("message", Exact(1), builtin_message),
        function("exception-type", Exact(1), builtin_exception_type),
        // Sequences
        function("length", Exact(1), builtin_length),
        function("get-index", Exact(2), builtin_get_index),
        function("set-index!", Exact(3), builtin_set_index),
        function("insert!", Exact(3), builtin_insert),
        function("append!", Exact(2), builtin_append),
        // Hashmaps
        function("get-key", Exact(2), builtin_get_key),
        function("set-key!", Exact(3), builtin_set_key),
        function("get-items", Exact(1), builtin_get_items),
        // Type predicates
        function("symbol?", Exact(1), builtin_is_symbol),
        function("list?", Exact(1), builtin_is_list),
        function("hashmap?", Exact(1), builtin_is_hashmap),
        function("string?", Exact(1), builtin_is_string),
        function("bytestring?", Exact(1), builtin_is_bytestring),
        function("character?", Exact(1), builtin_is_character),
    ]
});

/// Lazy static map from name to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.name, op)).collect()
    });

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by the name it is bound to
pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{kw, nil, sym, val};
    use crate::evaluator::{create_global_env, run_source};

    fn call(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_builtin_op(name).unwrap();
        op.arity.validate(op.name, args.len())?;
        match op.op_kind {
            OpKind::Function(f) => f(args),
            OpKind::Privileged(_) => panic!("{name} needs the evaluator"),
        }
    }

    fn raises(result: Result<Value, Error>) -> &'static str {
        match result {
            Err(err) => err.type_name().unwrap_or("exit"),
            Ok(value) => panic!("expected an exception, got {value:?}"),
        }
    }

    #[test]
    fn test_registry_is_complete_and_unique() {
        let names = [
            "+", "-", "*", "/", "mod", "div", "<", "same?", "equal?", "set-symbol!",
            "fresh-symbol", "printable", "input", "exit!", "call", "parse", "eval", "defined?",
            "open", "close!", "read", "write!", "flush!", "encode", "decode", "throw", "message",
            "exception-type", "length", "symbol?", "list?", "hashmap?", "string?", "bytestring?",
            "character?", "get-index", "set-index!", "insert!", "append!", "get-key", "set-key!",
            "get-items",
        ];
        for name in names {
            assert!(find_builtin_op(name).is_some(), "missing builtin {name}");
        }
        assert_eq!(get_builtin_ops().len(), names.len());
        assert_eq!(BUILTIN_BY_NAME.len(), names.len());
    }

    #[test]
    fn test_arity_validation() {
        let test_cases = vec![
            (Arity::Exact(2), 2, true),
            (Arity::Exact(2), 1, false),
            (Arity::Exact(2), 3, false),
            (Arity::AtLeast(1), 0, false),
            (Arity::AtLeast(1), 5, true),
            (Arity::Range(0, 1), 0, true),
            (Arity::Range(0, 1), 1, true),
            (Arity::Range(0, 1), 2, false),
        ];
        for (arity, count, ok) in test_cases {
            let result = arity.validate("op", count);
            assert_eq!(result.is_ok(), ok, "{arity:?} with {count} arguments");
            if let Err(err) = result {
                assert_eq!(err.type_name(), Some("wrong-argument-number"));
            }
        }
        let message = format!("{}", Arity::Exact(1).validate("length", 2).unwrap_err());
        assert!(message.contains("length takes 1 argument, but got 2"));
    }

    #[test]
    fn test_every_builtin_rejects_bad_argument_counts() {
        for op in get_builtin_ops() {
            let too_few = match op.arity {
                Arity::Exact(n) | Arity::AtLeast(n) | Arity::Range(n, _) => n.checked_sub(1),
            };
            let too_many = match op.arity {
                Arity::Exact(n) | Arity::Range(_, n) => Some(n + 1),
                Arity::AtLeast(_) => None,
            };
            for count in [too_few, too_many].into_iter().flatten() {
                let err = op.arity.validate(op.name, count).unwrap_err();
                assert_eq!(
                    err.type_name(),
                    Some("wrong-argument-number"),
                    "{} with {count} arguments",
                    op.name
                );
            }
        }
    }

    #[test]
    fn test_sequence_operations() {
        let list = val([1, 2, 3]);
        assert_eq!(call("length", &[list.clone()]).unwrap(), val(3));
        assert_eq!(call("get-index", &[list.clone(), val(0)]).unwrap(), val(1));
        assert_eq!(call("get-index", &[list.clone(), val(-1)]).unwrap(), val(3));
        assert_eq!(raises(call("get-index", &[list.clone(), val(3)])), "value-error");
        assert_eq!(raises(call("get-index", &[list.clone(), val(-4)])), "value-error");
        assert_eq!(raises(call("get-index", &[list.clone(), val("0")])), "wrong-type");

        call("set-index!", &[list.clone(), val(1), sym("b")]).unwrap();
        call("insert!", &[list.clone(), val(3), val(4)]).unwrap();
        call("insert!", &[list.clone(), val(0), val(0)]).unwrap();
        call("append!", &[list.clone(), val(5)]).unwrap();
        assert_eq!(list, val(vec![val(0), val(1), sym("b"), val(3), val(4), val(5)]));
        assert_eq!(raises(call("insert!", &[list.clone(), val(7), val(0)])), "value-error");

        let text = val("hat");
        assert_eq!(call("get-index", &[text.clone(), val(0)]).unwrap(), val('h'));
        call("set-index!", &[text.clone(), val(0), val('c')]).unwrap();
        call("append!", &[text.clone(), val('s')]).unwrap();
        assert_eq!(text, val("cats"));
        assert_eq!(raises(call("set-index!", &[text.clone(), val(0), val("c")])), "wrong-type");

        let bytes = Value::bytestring(vec![1, 2]);
        assert_eq!(call("get-index", &[bytes.clone(), val(1)]).unwrap(), val(2));
        call("insert!", &[bytes.clone(), val(0), val(255)]).unwrap();
        assert_eq!(bytes, Value::bytestring(vec![255, 1, 2]));
        assert_eq!(raises(call("append!", &[bytes.clone(), val(256)])), "value-error");
        assert_eq!(raises(call("append!", &[bytes, val('a')])), "wrong-type");

        assert_eq!(raises(call("length", &[val(5)])), "wrong-type");
        assert_eq!(call("length", &[nil()]).unwrap(), val(0));
    }

    #[test]
    fn test_hashmap_operations() {
        let map = Value::hashmap(Entries::new());
        call("set-key!", &[map.clone(), kw("b"), val(2)]).unwrap();
        call("set-key!", &[map.clone(), kw("a"), val(1)]).unwrap();
        assert_eq!(call("get-key", &[map.clone(), kw("a")]).unwrap(), val(1));
        assert_eq!(call("length", &[map.clone()]).unwrap(), val(2));
        assert_eq!(raises(call("get-key", &[map.clone(), kw("z")])), "missing-key");
        assert_eq!(raises(call("set-key!", &[map.clone(), nil(), val(1)])), "wrong-type");
        assert_eq!(
            call("get-items", &[map]).unwrap().to_string(),
            "((:a 1) (:b 2))"
        );
    }

    #[test]
    fn test_encoding() {
        let bytes = call("encode", &[val("héllo")]).unwrap();
        assert_eq!(call("length", &[bytes.clone()]).unwrap(), val(6));
        assert_eq!(call("decode", &[bytes]).unwrap(), val("héllo"));
        let invalid = Value::bytestring(vec![0xff, 0xfe]);
        assert_eq!(raises(call("decode", &[invalid])), "value-error");
        assert_eq!(raises(call("encode", &[val(1)])), "wrong-type");
    }

    #[test]
    fn test_exceptions_and_predicates() {
        assert_eq!(
            raises(call(
                "throw",
                &[Value::ExceptionType(&crate::exception::VALUE_ERROR), val("x")]
            )),
            "value-error"
        );
        assert_eq!(raises(call("throw", &[val(1), val("x")])), "wrong-type");
        assert_eq!(raises(call("message", &[val("not an exception")])), "wrong-type");

        let test_cases = vec![
            ("symbol?", sym("a"), true),
            ("symbol?", kw("a"), false),
            ("list?", nil(), true),
            ("hashmap?", Value::hashmap(Entries::new()), true),
            ("string?", val("s"), true),
            ("string?", val('s'), false),
            ("bytestring?", Value::bytestring(vec![]), true),
            ("character?", val('c'), true),
        ];
        for (name, value, expected) in test_cases {
            assert_eq!(call(name, &[value]).unwrap(), val(expected), "{name}");
        }
    }

    #[test]
    fn test_parse_and_printable() {
        assert_eq!(call("parse", &[val("(+ 1 2) x")]).unwrap().to_string(), "((+ 1 2) x)");
        assert_eq!(raises(call("parse", &[val("(+ 1")])), "parse-failed");
        assert_eq!(raises(call("parse", &[val("@")])), "lex-failed");
        assert_eq!(raises(call("parse", &[val("1/0")])), "division-by-zero");
        assert_eq!(call("printable", &[val("hi")]).unwrap(), val("hi"));
        assert_eq!(call("printable", &[val([1, 2])]).unwrap(), val("(1 2)"));
    }

    #[test]
    fn test_fresh_symbols_are_unspellable() {
        let symbol = call("fresh-symbol", &[]).unwrap();
        let Value::Symbol(name) = &symbol else {
            panic!("expected a symbol, got {symbol:?}");
        };
        assert!(name.ends_with("-unnamed"));
        assert!(name.starts_with(|c: char| c.is_ascii_digit()));
        assert_ne!(call("fresh-symbol", &[]).unwrap(), symbol);
    }

    #[test]
    fn test_builtins_are_first_class() {
        let env = create_global_env();
        let result = run_source("((lambda (op) (op 2 3)) *)", &env).unwrap();
        assert_eq!(result, val(6));
        let result = run_source("(equal? + +)", &env).unwrap();
        assert_eq!(result, val(true));
    }
}
