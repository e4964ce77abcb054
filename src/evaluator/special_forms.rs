//! Special forms.
//!
//! A special form receives its arguments unevaluated. Forms that need to
//! evaluate sub-expressions (`if`, `while`, `let`, `try`, `quote`,
//! `expand-macro`) become resumable frames and advance one step at a time
//! through the trampoline; `lambda` and `macro` complete immediately.

use std::cell::RefCell;
use std::rc::Rc;

use super::{Environment, Frame, FrameKind, FrameState, ScopeKind, Step};
use crate::ast::{Entries, Lambda, Macro, Parameters, Value};
use crate::builtinops::Arity;
use crate::exception::{ExceptionType, WRONG_ARGUMENT_NUMBER};
use crate::{Error, MAX_QUOTE_DEPTH};

/// Syntax bound by name in the global environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Let,
    If,
    While,
    Lambda,
    Macro,
    ExpandMacro,
    Quote,
    Try,
}

impl SpecialForm {
    pub const ALL: [SpecialForm; 8] = [
        SpecialForm::Let,
        SpecialForm::If,
        SpecialForm::While,
        SpecialForm::Lambda,
        SpecialForm::Macro,
        SpecialForm::ExpandMacro,
        SpecialForm::Quote,
        SpecialForm::Try,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SpecialForm::Let => "let",
            SpecialForm::If => "if",
            SpecialForm::While => "while",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Macro => "macro",
            SpecialForm::ExpandMacro => "expand-macro",
            SpecialForm::Quote => "quote",
            SpecialForm::Try => "try",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            SpecialForm::Let | SpecialForm::While | SpecialForm::Lambda => Arity::AtLeast(1),
            SpecialForm::If => Arity::Range(2, 3),
            SpecialForm::Macro => Arity::AtLeast(2),
            SpecialForm::ExpandMacro | SpecialForm::Quote => Arity::Exact(1),
            SpecialForm::Try => Arity::Exact(5),
        }
    }
}

/// Start evaluating `form` applied to unevaluated `arguments`
pub(super) fn begin(
    form: SpecialForm,
    arguments: Vec<Value>,
    environment: &Environment,
) -> Result<Step, Error> {
    form.arity().validate(form.name(), arguments.len())?;

    match (form, arguments.as_slice()) {
        (SpecialForm::If, [condition, consequent, alternative @ ..]) => {
            Ok(Step::Become(FrameKind::If {
                condition: condition.clone(),
                consequent: consequent.clone(),
                alternative: alternative.first().cloned(),
            }))
        }
        (SpecialForm::While, [condition, body @ ..]) => Ok(Step::Become(FrameKind::While {
            condition: condition.clone(),
            body: body.to_vec(),
        })),
        (SpecialForm::Let, [bindings, body @ ..]) => begin_let(bindings, body, environment),
        (SpecialForm::Try, [body, catch_keyword, type_expression, name, handler]) => {
            if !catch_keyword.is_keyword("catch") {
                return Err(Error::wrong_type(format!(
                    "try expects :catch after its body, but got: {catch_keyword}"
                )));
            }
            let Value::Symbol(name) = name else {
                return Err(Error::wrong_type(format!(
                    "try needs a symbol to bind the exception to, but got: {name}"
                )));
            };
            Ok(Step::Become(FrameKind::Try {
                type_expression: type_expression.clone(),
                body: body.clone(),
                name: name.clone(),
                handler: handler.clone(),
                catch_type: None,
            }))
        }
        (SpecialForm::Quote, [template]) => begin_quote(template),
        (SpecialForm::Lambda, [parameters, body @ ..]) => {
            let lambda = Lambda {
                parameters: Parameters::parse("lambda", parameters)?,
                body: body.to_vec(),
                environment: environment.clone(),
            };
            Ok(Step::Return(Value::Lambda(Rc::new(lambda))))
        }
        (SpecialForm::Macro, [name, parameters, body @ ..]) => {
            let Value::Symbol(name) = name else {
                return Err(Error::wrong_type(format!(
                    "Macro names must be symbols, but got: {name}"
                )));
            };
            let definition = Macro {
                name: name.clone(),
                parameters: Parameters::parse("macro", parameters)?,
                body: body.to_vec(),
            };
            environment
                .global_only()
                .define(name.clone(), Value::Macro(Rc::new(definition)));
            Ok(Step::Return(Value::Null))
        }
        (SpecialForm::ExpandMacro, [call]) => {
            let Value::List(items) = call else {
                return Err(Error::wrong_type(format!(
                    "expand-macro needs a macro call, but got: {call}"
                )));
            };
            let items = items.borrow();
            let [head, arguments @ ..] = items.as_slice() else {
                return Err(Error::wrong_type(
                    "expand-macro needs a macro call, but got: ()",
                ));
            };
            Ok(Step::Become(FrameKind::ExpandMacro {
                head: head.clone(),
                arguments: arguments.to_vec(),
            }))
        }
        (form, arguments) => Err(Error::raise(
            &WRONG_ARGUMENT_NUMBER,
            format!("Malformed {} form with {} arguments", form.name(), arguments.len()),
        )),
    }
}

/// Validate the whole binding list before anything is evaluated
fn begin_let(bindings: &Value, body: &[Value], environment: &Environment) -> Result<Step, Error> {
    let Value::List(bindings) = bindings else {
        return Err(Error::wrong_type(format!(
            "let bindings must be a list, but got: {bindings}"
        )));
    };
    let bindings = bindings.borrow();
    if bindings.len() % 2 != 0 {
        return Err(Error::raise(
            &WRONG_ARGUMENT_NUMBER,
            format!(
                "let bindings must alternate names and values, but got {} items",
                bindings.len()
            ),
        ));
    }

    let mut names = Vec::with_capacity(bindings.len() / 2);
    let mut values = Vec::with_capacity(bindings.len() / 2);
    for pair in bindings.chunks(2) {
        let [name, value] = pair else { continue };
        let Value::Symbol(name) = name else {
            return Err(Error::wrong_type(format!(
                "let can only bind symbols, but got: {name}"
            )));
        };
        names.push(name.clone());
        values.push(value.clone());
    }

    Ok(Step::Become(FrameKind::Let {
        names,
        values,
        body: body.to_vec(),
        scope: environment.with_nested_scope(ScopeKind::Let),
    }))
}

pub(super) fn step_if(
    condition: &Value,
    consequent: &Value,
    alternative: Option<&Value>,
    state: &mut FrameState,
) -> Result<Step, Error> {
    match state.step {
        0 => {
            state.step = 1;
            Ok(state.child(condition))
        }
        1 => {
            let branch = match state.take_result() {
                Value::Boolean(true) => consequent,
                Value::Boolean(false) => match alternative {
                    Some(alternative) => alternative,
                    None => return Ok(Step::Return(Value::Null)),
                },
                other => {
                    return Err(Error::wrong_type(format!(
                        "if conditions must be booleans, but got: {other}"
                    )));
                }
            };
            state.step = 2;
            Ok(state.child(branch))
        }
        _ => Ok(Step::Return(state.take_result())),
    }
}

pub(super) fn step_while(
    condition: &Value,
    body: &[Value],
    state: &mut FrameState,
) -> Result<Step, Error> {
    if state.step != 1 {
        // Start of an iteration: discard the previous body value
        state.step = 1;
        state.evaluated.clear();
        return Ok(state.child(condition));
    }
    match state.take_result() {
        Value::Boolean(true) => {
            state.step = 2;
            Ok(Step::Push(Frame::sequence(
                body.to_vec(),
                state.environment.clone(),
            )))
        }
        Value::Boolean(false) => Ok(Step::Return(Value::Null)),
        other => Err(Error::wrong_type(format!(
            "while conditions must be booleans, but got: {other}"
        ))),
    }
}

/// Step `i + 1` means the value of binding `i` is being evaluated; after the
/// last binding the body runs in the let scope
pub(super) fn step_let(
    names: &[String],
    values: &[Value],
    body: &[Value],
    scope: &Environment,
    state: &mut FrameState,
) -> Result<Step, Error> {
    if let Some(name) = state.step.checked_sub(1).and_then(|index| names.get(index)) {
        let value = state.take_result();
        scope.define(name.clone(), value);
    }
    if let Some(value) = values.get(state.step) {
        state.step += 1;
        return Ok(Step::Push(Frame::new(value.clone(), scope.clone())));
    }
    if state.step == values.len() {
        state.step += 1;
        return Ok(Step::Push(Frame::sequence(body.to_vec(), scope.clone())));
    }
    Ok(Step::Return(state.take_result()))
}

/// The frame is armed once `catch_type` is set. Unwinding moves it to step 2
/// with the catch body pushed.
pub(super) fn step_try(
    type_expression: &Value,
    body: &Value,
    catch_type: &mut Option<&'static ExceptionType>,
    state: &mut FrameState,
) -> Result<Step, Error> {
    match state.step {
        0 => {
            state.step = 1;
            Ok(state.child(type_expression))
        }
        1 => match state.take_result() {
            Value::ExceptionType(exception_type) => {
                *catch_type = Some(exception_type);
                state.step = 2;
                Ok(state.child(body))
            }
            other => Err(Error::wrong_type(format!(
                "try can only catch exception types, but got: {other}"
            ))),
        },
        _ => Ok(Step::Return(state.take_result())),
    }
}

pub(super) fn step_expand_macro(
    head: &Value,
    arguments: &[Value],
    state: &mut FrameState,
) -> Result<Step, Error> {
    if state.step == 0 {
        state.step = 1;
        return Ok(state.child(head));
    }
    match state.take_result() {
        Value::Macro(definition) => Ok(Step::Become(FrameKind::MacroCall {
            definition,
            arguments: arguments.to_vec(),
            expand_only: true,
        })),
        other => Err(Error::wrong_type(format!(
            "expand-macro needs a macro call, but {other} is not a macro"
        ))),
    }
}

//
// Quote
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Unquote,
    Splice,
}

impl Marker {
    fn name(self) -> &'static str {
        match self {
            Marker::Unquote => "unquote",
            Marker::Splice => "unquote*",
        }
    }
}

fn splice_outside_list() -> Error {
    Error::value_error("unquote* cannot be used outside of a list")
}

fn too_deep() -> Error {
    Error::value_error(format!(
        "quote cannot copy structures nested deeper than {MAX_QUOTE_DEPTH}"
    ))
}

/// Recognise `(unquote x)` and `(unquote* x)`, returning the marker and `x`
fn as_unquote(expression: &Value) -> Result<Option<(Marker, Value)>, Error> {
    let Value::List(items) = expression else {
        return Ok(None);
    };
    let items = items.borrow();
    let marker = match items.first() {
        Some(head) if head.is_symbol(Marker::Unquote.name()) => Marker::Unquote,
        Some(head) if head.is_symbol(Marker::Splice.name()) => Marker::Splice,
        _ => return Ok(None),
    };
    match items.as_slice() {
        [_, operand] => Ok(Some((marker, operand.clone()))),
        _ => Err(Error::arity_error(marker.name(), 1, items.len() - 1)),
    }
}

/// Collect every unquote operand in `template`, depth first
fn collect_operands(template: &Value, depth: usize, operands: &mut Vec<Value>) -> Result<(), Error> {
    if depth > MAX_QUOTE_DEPTH {
        return Err(too_deep());
    }
    if let Some((_, operand)) = as_unquote(template)? {
        operands.push(operand);
        return Ok(());
    }
    match template {
        Value::List(items) => {
            for item in items.borrow().iter() {
                collect_operands(item, depth + 1, operands)?;
            }
        }
        Value::Hashmap(entries) => {
            for value in entries.borrow().values() {
                if let Some((Marker::Splice, _)) = as_unquote(value)? {
                    return Err(splice_outside_list());
                }
                collect_operands(value, depth + 1, operands)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn begin_quote(template: &Value) -> Result<Step, Error> {
    if let Some((Marker::Splice, _)) = as_unquote(template)? {
        return Err(splice_outside_list());
    }
    let mut operands = Vec::new();
    collect_operands(template, 0, &mut operands)?;

    if operands.is_empty() {
        return Ok(Step::Return(build(template, 0, &mut Vec::new().into_iter())?));
    }
    Ok(Step::Become(FrameKind::Quote {
        template: template.clone(),
        operands,
    }))
}

pub(super) fn step_quote(
    template: &Value,
    operands: &[Value],
    state: &mut FrameState,
) -> Result<Step, Error> {
    if let Some(operand) = operands.get(state.evaluated.len()) {
        return Ok(state.child(operand));
    }
    let values = std::mem::take(&mut state.evaluated);
    Ok(Step::Return(build(template, 0, &mut values.into_iter())?))
}

/// Deep-copy `template`, consuming evaluated operands in the same depth-first
/// order `collect_operands` produced them
fn build(
    template: &Value,
    depth: usize,
    values: &mut std::vec::IntoIter<Value>,
) -> Result<Value, Error> {
    if depth > MAX_QUOTE_DEPTH {
        return Err(too_deep());
    }
    if as_unquote(template)?.is_some() {
        return Ok(values.next().unwrap_or(Value::Null));
    }

    match template {
        Value::List(items) => {
            let mut copied = Vec::with_capacity(items.borrow().len());
            for item in items.borrow().iter() {
                match as_unquote(item)? {
                    Some((Marker::Splice, _)) => match values.next() {
                        Some(Value::List(spliced)) => {
                            copied.extend(spliced.borrow().iter().cloned());
                        }
                        Some(other) => {
                            return Err(Error::wrong_type(format!(
                                "unquote* needs a list to splice, but got: {other}"
                            )));
                        }
                        None => {}
                    },
                    _ => copied.push(build(item, depth + 1, values)?),
                }
            }
            Ok(Value::list(copied))
        }
        Value::String(chars) => Ok(Value::String(Rc::new(RefCell::new(chars.borrow().clone())))),
        Value::Bytestring(bytes) => Ok(Value::bytestring(bytes.borrow().clone())),
        Value::Hashmap(entries) => {
            let mut copied = Entries::with_capacity(entries.borrow().len());
            for (key, value) in entries.borrow().iter() {
                copied.insert(key.clone(), build(value, depth + 1, values)?);
            }
            Ok(Value::hashmap(copied))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use crate::parser::parse;

    fn template(source: &str) -> Value {
        parse(source).unwrap().remove(0)
    }

    #[test]
    fn test_names_and_arity() {
        for form in SpecialForm::ALL {
            assert!(!form.name().is_empty());
        }
        assert_eq!(SpecialForm::If.arity(), Arity::Range(2, 3));
        assert_eq!(SpecialForm::Try.arity(), Arity::Exact(5));
        assert_eq!(SpecialForm::ExpandMacro.name(), "expand-macro");
    }

    #[test]
    fn test_operands_are_collected_depth_first() {
        let mut operands = Vec::new();
        collect_operands(
            &template("(a (unquote x) (b (unquote* y)) (unquote z))"),
            0,
            &mut operands,
        )
        .unwrap();
        assert_eq!(operands, vec![sym("x"), sym("y"), sym("z")]);
    }

    #[test]
    fn test_build_substitutes_and_splices() {
        let quoted = template("(a (unquote x) (b (unquote* y)) (unquote z))");
        let values = vec![val(1), val([2, 3]), val("s")];
        let built = build(&quoted, 0, &mut values.into_iter()).unwrap();
        assert_eq!(built.to_string(), "(a 1 (b 2 3) \"s\")");
    }

    #[test]
    fn test_build_copies_containers() {
        let quoted = template("(\"text\" (1 2))");
        let built = build(&quoted, 0, &mut Vec::new().into_iter()).unwrap();
        assert_eq!(built, quoted);
        assert!(!built.is_same(&quoted));

        let (Value::List(original), Value::List(copy)) = (&quoted, &built) else {
            panic!("expected lists");
        };
        assert!(!original.borrow()[0].is_same(&copy.borrow()[0]));
        assert!(!original.borrow()[1].is_same(&copy.borrow()[1]));
    }

    #[test]
    fn test_marker_validation() {
        let err = as_unquote(&template("(unquote a b)")).unwrap_err();
        assert_eq!(err.type_name(), Some("wrong-argument-number"));
        assert_eq!(as_unquote(&template("(other a)")).unwrap(), None);
        assert_eq!(
            as_unquote(&template("(unquote* a)")).unwrap(),
            Some((Marker::Splice, sym("a")))
        );
    }

    #[test]
    fn test_cyclic_template_is_rejected() {
        let cyclic = val([1]);
        if let Value::List(items) = &cyclic {
            items.borrow_mut().push(cyclic.clone());
        }
        let mut operands = Vec::new();
        let err = collect_operands(&cyclic, 0, &mut operands).unwrap_err();
        assert_eq!(err.type_name(), Some("value-error"));

        // Break the cycle so the test does not leak
        if let Value::List(items) = &cyclic {
            items.borrow_mut().clear();
        }
    }
}
