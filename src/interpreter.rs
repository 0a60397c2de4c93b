//! Recompilation of a rewritten function into something callable.
//!
//! A [`CompiledFunction`] pairs a validated definition with the closure
//! bindings it was compiled against and executes it by walking the tree.

use std::rc::Rc;

use log::trace;
use rustc_hash::FxHashSet;

use crate::ast::{Expression, FunctionDef, Statement};
use crate::runtime::error::RuntimeError;
use crate::runtime::{Bindings, Value};
use crate::unparse;

mod error;
mod runtime;

pub use error::{InterpreterError, RecompilationError};
use runtime::{Environment, ExecResult, InterpreterRuntime};

/// Everything observable about one call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    /// The returned value; `None` when the body falls off the end.
    pub value: Value,
    /// Values produced by `yield`, in order. Generators are collected eagerly.
    pub yields: Vec<Value>,
    /// Lines written by `print`.
    pub output: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledFunction {
    def: Rc<FunctionDef>,
    scope: Rc<Bindings>,
    defaults: Rc<Vec<Option<Value>>>,
    local_names: Rc<FxHashSet<String>>,
    is_generator: bool,
}

/// Validates `def` and closes it over `bindings`.
///
/// Parameter defaults are evaluated once, here, against `bindings`.
pub fn compile(def: &FunctionDef, bindings: &Bindings) -> Result<CompiledFunction, RecompilationError> {
    validate(def)?;

    let mut local_names = FxHashSet::default();
    for param in &def.params {
        local_names.insert(param.name.clone());
    }
    collect_assigned_names(&def.body, &mut local_names);

    let empty = FxHashSet::default();
    let mut defaults = Vec::with_capacity(def.params.len());
    for param in &def.params {
        let Some(default) = &param.default else {
            defaults.push(None);
            continue;
        };
        let mut environment = Environment::new(bindings, &empty);
        let value = InterpreterRuntime::new()
            .eval_expression(default, &mut environment)
            .map_err(|source| RecompilationError::DefaultEvaluation {
                param: param.name.clone(),
                source,
            })?;
        defaults.push(Some(value));
    }

    trace!(
        "Compiled '{}' with {} closure bindings",
        def.name,
        bindings.len()
    );
    Ok(CompiledFunction {
        def: Rc::new(def.clone()),
        scope: Rc::new(bindings.clone()),
        defaults: Rc::new(defaults),
        local_names: Rc::new(local_names),
        is_generator: contains_yield(&def.body),
    })
}

impl CompiledFunction {
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn definition(&self) -> &FunctionDef {
        &self.def
    }

    pub fn bindings(&self) -> &Bindings {
        &self.scope
    }

    pub fn is_generator(&self) -> bool {
        self.is_generator
    }

    /// Canonical source of the compiled definition.
    pub fn source(&self) -> String {
        unparse::render_function(&self.def)
    }

    pub fn call(&self, args: &[Value]) -> Result<CallOutcome, InterpreterError> {
        let params = &self.def.params;
        let required = self.defaults.iter().filter(|default| default.is_none()).count();
        if args.len() < required || args.len() > params.len() {
            let expected = if required == params.len() {
                required.to_string()
            } else {
                format!("{required} to {}", params.len())
            };
            return Err(InterpreterError::FunctionArityMismatch {
                name: self.def.name.clone(),
                expected,
                found: args.len(),
            });
        }

        let mut environment = Environment::new(&self.scope, &self.local_names);
        for (index, (param, default)) in params.iter().zip(self.defaults.iter()).enumerate() {
            let value = match args.get(index) {
                Some(value) => value.clone(),
                None => default.clone().unwrap_or(Value::None),
            };
            environment.store(&param.name, value);
        }

        let mut runtime = InterpreterRuntime::new();
        let value = match runtime.exec_block(&self.def.body, &mut environment)? {
            ExecResult::Return(value) => value,
            ExecResult::Continue | ExecResult::Break | ExecResult::NextIteration => Value::None,
        };
        Ok(CallOutcome {
            value,
            yields: runtime.yields,
            output: runtime.output,
        })
    }

    /// Exposes this function as a value other functions can call.
    ///
    /// Generators evaluate to the list of their yields.
    pub fn to_native(&self) -> Value {
        let function = self.clone();
        Value::native(&self.def.name, move |args| {
            let outcome = function.call(args).map_err(|error| match error {
                InterpreterError::Runtime(error) => error,
                other => RuntimeError::Native {
                    name: function.def.name.clone(),
                    message: other.to_string(),
                },
            })?;
            if function.is_generator {
                Ok(Value::list(outcome.yields))
            } else {
                Ok(outcome.value)
            }
        })
    }
}

fn validate(def: &FunctionDef) -> Result<(), RecompilationError> {
    let mut seen = FxHashSet::default();
    let mut saw_default = false;
    for param in &def.params {
        if !seen.insert(param.name.as_str()) {
            return Err(RecompilationError::DuplicateParameter {
                name: param.name.clone(),
                function: def.name.clone(),
            });
        }
        if param.default.is_some() {
            saw_default = true;
        } else if saw_default {
            return Err(RecompilationError::NonDefaultAfterDefault {
                name: param.name.clone(),
                function: def.name.clone(),
            });
        }
    }
    validate_block(&def.body, &def.name, 0)
}

fn validate_block(body: &[Statement], function: &str, loop_depth: usize) -> Result<(), RecompilationError> {
    for statement in body {
        match statement {
            Statement::FunctionDef(nested) => {
                return Err(RecompilationError::NestedFunctionDefinition {
                    name: nested.name.clone(),
                });
            }
            Statement::Break | Statement::Continue if loop_depth == 0 => {
                return Err(RecompilationError::OutsideLoop {
                    statement: if matches!(statement, Statement::Break) {
                        "break"
                    } else {
                        "continue"
                    },
                    function: function.to_string(),
                });
            }
            Statement::For { body, .. } | Statement::While { body, .. } => {
                validate_block(body, function, loop_depth + 1)?;
            }
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                validate_block(then_body, function, loop_depth)?;
                validate_block(else_body, function, loop_depth)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn collect_assigned_names(body: &[Statement], names: &mut FxHashSet<String>) {
    for statement in body {
        match statement {
            Statement::Assign { target, .. } | Statement::AugAssign { target, .. } => {
                names.extend(target.bound_names().into_iter().map(str::to_string));
            }
            Statement::For { target, body, .. } => {
                names.extend(target.bound_names().into_iter().map(str::to_string));
                collect_assigned_names(body, names);
            }
            Statement::While { body, .. } => collect_assigned_names(body, names),
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                collect_assigned_names(then_body, names);
                collect_assigned_names(else_body, names);
            }
            _ => {}
        }
    }
}

fn contains_yield(body: &[Statement]) -> bool {
    body.iter().any(|statement| match statement {
        Statement::Assign { value, .. } | Statement::AugAssign { value, .. } => {
            expression_yields(value)
        }
        Statement::For { iterable, body, .. } => expression_yields(iterable) || contains_yield(body),
        Statement::While { condition, body } => expression_yields(condition) || contains_yield(body),
        Statement::If {
            condition,
            then_body,
            else_body,
        } => expression_yields(condition) || contains_yield(then_body) || contains_yield(else_body),
        Statement::Return(Some(value)) | Statement::Expr(value) => expression_yields(value),
        _ => false,
    })
}

fn expression_yields(expression: &Expression) -> bool {
    match expression {
        Expression::Yield(_) => true,
        Expression::List(elements) | Expression::Tuple(elements) | Expression::Set(elements) => {
            elements.iter().any(expression_yields)
        }
        Expression::Dict(entries) => entries
            .iter()
            .any(|(key, value)| expression_yields(key) || expression_yields(value)),
        Expression::Index { object, index } => expression_yields(object) || expression_yields(index),
        Expression::Attribute { object, .. } => expression_yields(object),
        Expression::UnaryOp { operand, .. } => expression_yields(operand),
        Expression::BinaryOp { left, right, .. } => expression_yields(left) || expression_yields(right),
        Expression::BoolOp { values, .. } => values.iter().any(expression_yields),
        Expression::Compare {
            left, comparators, ..
        } => expression_yields(left) || comparators.iter().any(expression_yields),
        Expression::Call { callee, args } => {
            expression_yields(callee) || args.iter().any(expression_yields)
        }
        _ => false,
    }
}
