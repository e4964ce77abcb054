//! The trampolined evaluator.
//!
//! Every pending evaluation is a [`Frame`] on an explicit [`Stack`]. The driver
//! loop repeatedly advances the top frame by one step; a step either pushes a
//! child frame, returns a value to the parent frame, or turns the frame into a
//! different kind of frame (for example, a list expression becomes a function
//! application once its head has been evaluated). Nothing recurses on the
//! host stack, so deep user recursion is limited only by
//! [`EvalConfig::max_stack_depth`].
//!
//! Exceptions raised by a step unwind the explicit stack to the nearest armed
//! `try` frame whose catch type matches (see [`Stack::unwind`]).

use std::rc::Rc;

use crate::ast::{Entries, HashKey, Macro, Value};
use crate::builtinops::{OpKind, get_builtin_ops};
use crate::exception::{BUILTIN_EXCEPTION_TYPES, ExceptionType, STACK_OVERFLOW};
use crate::{Error, MAX_STACK_DEPTH, parser};

pub mod environment;
pub mod special_forms;

pub use environment::{Environment, ScopeKind};
use special_forms::SpecialForm;

/// Tunables for a single evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalConfig {
    /// Frames the stack may hold before pushing raises `stack-overflow`
    pub max_stack_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_stack_depth: MAX_STACK_DEPTH,
        }
    }
}

/// One pending evaluation
pub struct Frame {
    kind: FrameKind,
    state: FrameState,
}

/// Progress shared by every kind of frame
struct FrameState {
    environment: Environment,
    /// Kind-specific position within the frame's state machine
    step: usize,
    /// Results handed back by child frames, in order
    evaluated: Vec<Value>,
}

enum FrameKind {
    /// Any expression not yet dispatched on
    Expression(Value),
    /// Evaluate `arguments`, then call `callee` with them
    Apply {
        callee: Value,
        arguments: Vec<Value>,
    },
    /// Evaluate each expression in turn, keeping the last value
    Sequence(Vec<Value>),
    /// Expand a macro call and, unless `expand_only`, evaluate the expansion
    MacroCall {
        definition: Rc<Macro>,
        arguments: Vec<Value>,
        expand_only: bool,
    },
    /// Evaluate hashmap literal values, keys are taken as written
    HashmapLiteral(Vec<(HashKey, Value)>),
    If {
        condition: Value,
        consequent: Value,
        alternative: Option<Value>,
    },
    While {
        condition: Value,
        body: Vec<Value>,
    },
    Let {
        names: Vec<String>,
        values: Vec<Value>,
        body: Vec<Value>,
        scope: Environment,
    },
    Try {
        type_expression: Value,
        body: Value,
        name: String,
        handler: Value,
        /// Set once the type expression has been evaluated; only then does
        /// this frame intercept exceptions
        catch_type: Option<&'static ExceptionType>,
    },
    Quote {
        template: Value,
        operands: Vec<Value>,
    },
    /// Evaluate the head of a macro call, then expand it without evaluating
    ExpandMacro {
        head: Value,
        arguments: Vec<Value>,
    },
}

/// Outcome of advancing a frame by one step
enum Step {
    Push(Frame),
    Return(Value),
    Become(FrameKind),
}

/// What a privileged built-in asks of the trampoline
pub enum Action {
    Return(Value),
    /// Evaluate this frame; its value becomes the built-in's result
    Evaluate(Frame),
}

impl Frame {
    /// A frame evaluating `expression` in `environment`
    pub fn new(expression: Value, environment: Environment) -> Self {
        Self::with_kind(FrameKind::Expression(expression), environment)
    }

    /// A frame calling `callee` with already-evaluated arguments
    pub fn apply(callee: Value, arguments: Vec<Value>, environment: Environment) -> Self {
        let mut frame = Self::with_kind(
            FrameKind::Apply {
                callee,
                arguments: Vec::new(),
            },
            environment,
        );
        frame.state.evaluated = arguments;
        frame
    }

    fn sequence(body: Vec<Value>, environment: Environment) -> Self {
        Self::with_kind(FrameKind::Sequence(body), environment)
    }

    fn with_kind(kind: FrameKind, environment: Environment) -> Self {
        Frame {
            kind,
            state: FrameState {
                environment,
                step: 0,
                evaluated: Vec::new(),
            },
        }
    }

    fn advance(&mut self) -> Result<Step, Error> {
        let state = &mut self.state;
        match &mut self.kind {
            FrameKind::Expression(expression) => step_expression(expression, state),
            FrameKind::Apply { callee, arguments } => step_apply(callee, arguments, state),
            FrameKind::Sequence(body) => step_sequence(body, state),
            FrameKind::MacroCall {
                definition,
                arguments,
                expand_only,
            } => step_macro_call(definition, arguments, *expand_only, state),
            FrameKind::HashmapLiteral(entries) => step_hashmap_literal(entries, state),
            FrameKind::If {
                condition,
                consequent,
                alternative,
            } => special_forms::step_if(condition, consequent, alternative.as_ref(), state),
            FrameKind::While { condition, body } => {
                special_forms::step_while(condition, body, state)
            }
            FrameKind::Let {
                names,
                values,
                body,
                scope,
            } => special_forms::step_let(names, values, body, scope, state),
            FrameKind::Try {
                type_expression,
                body,
                catch_type,
                ..
            } => special_forms::step_try(type_expression, body, catch_type, state),
            FrameKind::Quote { template, operands } => {
                special_forms::step_quote(template, operands, state)
            }
            FrameKind::ExpandMacro { head, arguments } => {
                special_forms::step_expand_macro(head, arguments, state)
            }
        }
    }
}

impl FrameState {
    /// A child frame evaluating `expression` in this frame's environment
    fn child(&self, expression: &Value) -> Step {
        Step::Push(Frame::new(expression.clone(), self.environment.clone()))
    }

    /// The most recent child result. A frame only asks after pushing a child.
    fn take_result(&mut self) -> Value {
        self.evaluated.pop().unwrap_or(Value::Null)
    }
}

fn step_expression(expression: &Value, state: &mut FrameState) -> Result<Step, Error> {
    match expression {
        Value::Symbol(name) => {
            let value = state
                .environment
                .get(name)
                .ok_or_else(|| Error::no_such_variable(name))?;
            Ok(Step::Return(value))
        }
        Value::Hashmap(entries) => {
            let entries: Vec<(HashKey, Value)> = entries
                .borrow()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Ok(Step::Become(FrameKind::HashmapLiteral(entries)))
        }
        Value::List(items) => {
            let items = items.borrow();
            let Some(head) = items.first() else {
                return Err(Error::value_error("Cannot evaluate an empty list"));
            };
            if state.step == 0 {
                state.step = 1;
                return Ok(state.child(head));
            }
            let callee = state.take_result();
            let arguments = items[1..].to_vec();
            dispatch(callee, arguments, &state.environment)
        }
        other => Ok(Step::Return(other.clone())),
    }
}

/// Decide what a list expression means once its head has been evaluated
fn dispatch(callee: Value, arguments: Vec<Value>, environment: &Environment) -> Result<Step, Error> {
    match callee {
        Value::Function(_) | Value::Lambda(_) => Ok(Step::Become(FrameKind::Apply {
            callee,
            arguments,
        })),
        Value::Macro(definition) => Ok(Step::Become(FrameKind::MacroCall {
            definition,
            arguments,
            expand_only: false,
        })),
        Value::SpecialForm(form) => special_forms::begin(form, arguments, environment),
        other => Err(Error::wrong_type(format!(
            "Only functions, macros and special forms can be called, but got: {other}"
        ))),
    }
}

fn step_apply(callee: &Value, arguments: &[Value], state: &mut FrameState) -> Result<Step, Error> {
    if state.step == 1 {
        return Ok(Step::Return(state.take_result()));
    }
    if let Some(argument) = arguments.get(state.evaluated.len()) {
        return Ok(state.child(argument));
    }

    let args = std::mem::take(&mut state.evaluated);
    state.step = 1;
    match callee {
        Value::Function(op) => {
            op.arity.validate(op.name, args.len())?;
            match op.op_kind {
                OpKind::Function(function) => Ok(Step::Return(function(&args)?)),
                OpKind::Privileged(function) => match function(&args, &state.environment)? {
                    Action::Return(value) => Ok(Step::Return(value)),
                    Action::Evaluate(frame) => Ok(Step::Push(frame)),
                },
            }
        }
        Value::Lambda(lambda) => {
            let scope = lambda.environment.with_nested_scope(ScopeKind::Function);
            for (name, value) in lambda.parameters.bind("lambda", args)? {
                scope.define(name, value);
            }
            Ok(Step::Push(Frame::sequence(lambda.body.clone(), scope)))
        }
        other => Err(Error::wrong_type(format!(
            "Only functions and lambdas can be applied, but got: {other}"
        ))),
    }
}

fn step_sequence(body: &[Value], state: &mut FrameState) -> Result<Step, Error> {
    match body.get(state.step) {
        Some(expression) => {
            state.step += 1;
            state.evaluated.clear();
            Ok(state.child(expression))
        }
        None => Ok(Step::Return(state.take_result())),
    }
}

fn step_macro_call(
    definition: &Rc<Macro>,
    arguments: &[Value],
    expand_only: bool,
    state: &mut FrameState,
) -> Result<Step, Error> {
    match state.step {
        0 => {
            let scope = state
                .environment
                .global_only()
                .with_nested_scope(ScopeKind::Function);
            for (name, value) in definition.parameters.bind(&definition.name, arguments.to_vec())? {
                scope.define(name, value);
            }
            state.step = 1;
            Ok(Step::Push(Frame::sequence(definition.body.clone(), scope)))
        }
        1 => {
            let expansion = state.take_result();
            tracing::debug!(name = %definition.name, %expansion, "expanded macro");
            if expand_only {
                return Ok(Step::Return(expansion));
            }
            state.step = 2;
            Ok(state.child(&expansion))
        }
        _ => Ok(Step::Return(state.take_result())),
    }
}

fn step_hashmap_literal(entries: &[(HashKey, Value)], state: &mut FrameState) -> Result<Step, Error> {
    if let Some((_, value)) = entries.get(state.evaluated.len()) {
        return Ok(state.child(value));
    }
    let values = std::mem::take(&mut state.evaluated);
    let hashmap: Entries = entries
        .iter()
        .map(|(key, _)| key.clone())
        .zip(values)
        .collect();
    Ok(Step::Return(Value::hashmap(hashmap)))
}

/// The explicit evaluation stack
pub struct Stack {
    frames: Vec<Frame>,
    config: EvalConfig,
}

impl Stack {
    pub fn new(config: EvalConfig) -> Self {
        Stack {
            frames: Vec::new(),
            config,
        }
    }

    /// Drive `root` to completion
    pub fn run(&mut self, root: Frame) -> Result<Value, Error> {
        self.frames.clear();
        self.frames.push(root);

        while let Some(frame) = self.frames.last_mut() {
            match frame.advance() {
                Ok(Step::Become(kind)) => {
                    frame.kind = kind;
                    frame.state.step = 0;
                    frame.state.evaluated.clear();
                }
                Ok(Step::Push(child)) => {
                    if self.frames.len() >= self.config.max_stack_depth {
                        tracing::debug!(depth = self.frames.len(), "stack overflow");
                        self.unwind(Error::raise(
                            &STACK_OVERFLOW,
                            format!(
                                "Exceeded the maximum stack depth of {}",
                                self.config.max_stack_depth
                            ),
                        ))?;
                    } else {
                        tracing::trace!(depth = self.frames.len(), "push frame");
                        self.frames.push(child);
                    }
                }
                Ok(Step::Return(value)) => {
                    self.frames.pop();
                    match self.frames.last_mut() {
                        Some(parent) => parent.state.evaluated.push(value),
                        None => return Ok(value),
                    }
                }
                Err(error) => self.unwind(error)?,
            }
        }

        Ok(Value::Null)
    }

    /// Route `error` to the nearest armed `try` frame that catches it.
    ///
    /// On a match every frame above the `try` is discarded, the `try` is
    /// disarmed and a frame evaluating its catch body (with the exception
    /// bound) is pushed. Otherwise the error is handed back unchanged.
    fn unwind(&mut self, error: Error) -> Result<(), Error> {
        let Error::Exception(exception) = &error else {
            return Err(error);
        };
        let exception_type = exception.exception_type();

        let position = self.frames.iter().rposition(|frame| {
            matches!(
                frame.kind,
                FrameKind::Try { catch_type: Some(catch_type), .. }
                    if exception_type.is_subtype_of(catch_type)
            )
        });
        let Some(position) = position else {
            return Err(error);
        };

        self.frames.truncate(position + 1);
        let Some(frame) = self.frames.last_mut() else {
            return Err(error);
        };
        let FrameKind::Try {
            name,
            handler,
            catch_type,
            ..
        } = &mut frame.kind
        else {
            return Err(error);
        };

        tracing::debug!(
            exception_type = exception_type.name,
            message = exception.message(),
            "caught exception"
        );
        exception.mark_caught();
        *catch_type = None;
        frame.state.step = 2;
        frame.state.evaluated.clear();

        let scope = frame.state.environment.with_nested_scope(ScopeKind::Let);
        scope.define(name.clone(), Value::Exception(Rc::clone(exception)));
        let handler_frame = Frame::new(handler.clone(), scope);
        self.frames.push(handler_frame);
        Ok(())
    }
}

/// Evaluate an expression with the default configuration
pub fn evaluate(expression: &Value, environment: &Environment) -> Result<Value, Error> {
    evaluate_with_config(expression, environment, &EvalConfig::default())
}

/// Evaluate an expression on a fresh stack
pub fn evaluate_with_config(
    expression: &Value,
    environment: &Environment,
    config: &EvalConfig,
) -> Result<Value, Error> {
    let mut stack = Stack::new(config.clone());
    stack.run(Frame::new(expression.clone(), environment.clone()))
}

/// Evaluate expressions in order, returning the last value (`#null` if none)
pub fn evaluate_all(expressions: &[Value], environment: &Environment) -> Result<Value, Error> {
    let mut result = Value::Null;
    for expression in expressions {
        result = evaluate(expression, environment)?;
    }
    Ok(result)
}

/// Lex, parse and evaluate every top-level form in `source`
pub fn run_source(source: &str, environment: &Environment) -> Result<Value, Error> {
    let forms = parser::parse(source)?;
    evaluate_all(&forms, environment)
}

/// Create a global environment with built-in functions, special forms and
/// exception types
pub fn create_global_env() -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        env.define(builtin_op.name, Value::Function(builtin_op));
    }
    for form in SpecialForm::ALL {
        env.define(form.name(), Value::SpecialForm(form));
    }
    for exception_type in BUILTIN_EXCEPTION_TYPES {
        env.define(exception_type.name, Value::ExceptionType(exception_type));
    }

    env
}
