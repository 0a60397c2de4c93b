use std::collections::HashMap;

use rustc_hash::FxHashSet;

use crate::ast::{AssignTarget, BoolOperator, Expression, Statement};
use crate::builtins::BuiltinFunction;
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;
use crate::runtime::{Bindings, ops};

use super::InterpreterError;

/// Control-flow marker for statement execution.
pub(super) enum ExecResult {
    Continue,
    Return(Value),
    Break,
    NextIteration,
}

/// Function-local variables over the read-only enclosing bindings.
pub(super) struct Environment<'a> {
    scope: &'a Bindings,
    local_names: &'a FxHashSet<String>,
    locals: HashMap<String, Value>,
}

impl<'a> Environment<'a> {
    pub(super) fn new(scope: &'a Bindings, local_names: &'a FxHashSet<String>) -> Self {
        Self {
            scope,
            local_names,
            locals: HashMap::new(),
        }
    }

    fn load(&self, name: &str) -> Result<Value, InterpreterError> {
        if let Some(value) = self.locals.get(name) {
            return Ok(value.clone());
        }
        if self.local_names.contains(name) {
            return Err(InterpreterError::UnboundLocal {
                name: name.to_string(),
            });
        }
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        BuiltinFunction::from_name(name)
            .map(Value::Builtin)
            .ok_or_else(|| {
                RuntimeError::UndefinedVariable {
                    name: name.to_string(),
                }
                .into()
            })
    }

    pub(super) fn store(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_string(), value);
    }
}

/// Runtime executor for one call of a compiled function.
pub(super) struct InterpreterRuntime {
    pub(super) output: Vec<String>,
    pub(super) yields: Vec<Value>,
}

impl InterpreterRuntime {
    pub(super) fn new() -> Self {
        Self {
            output: Vec::new(),
            yields: Vec::new(),
        }
    }

    pub(super) fn exec_block(
        &mut self,
        body: &[Statement],
        environment: &mut Environment<'_>,
    ) -> Result<ExecResult, InterpreterError> {
        for statement in body {
            match self.exec_statement(statement, environment)? {
                ExecResult::Continue => {}
                other => return Ok(other),
            }
        }
        Ok(ExecResult::Continue)
    }

    fn exec_statement(
        &mut self,
        statement: &Statement,
        environment: &mut Environment<'_>,
    ) -> Result<ExecResult, InterpreterError> {
        match statement {
            Statement::FunctionDef(def) => Err(RuntimeError::NotSupported {
                feature: format!("nested function '{}'", def.name),
            }
            .into()),
            Statement::Assign { target, value } => {
                let value = self.eval_expression(value, environment)?;
                self.assign(target, value, environment)?;
                Ok(ExecResult::Continue)
            }
            Statement::AugAssign { target, op, value } => {
                let current = match target {
                    AssignTarget::Name(name) => environment.load(name)?,
                    AssignTarget::Index { object, index } => {
                        let object = self.eval_expression(object, environment)?;
                        let index = self.eval_expression(index, environment)?;
                        ops::index(&object, &index)?
                    }
                    AssignTarget::Attribute { .. } | AssignTarget::Tuple(_) => {
                        return Err(RuntimeError::NotSupported {
                            feature: "augmented assignment to this target".to_string(),
                        }
                        .into());
                    }
                };
                let value = self.eval_expression(value, environment)?;
                let updated = ops::binary(*op, &current, &value)?;
                self.assign(target, updated, environment)?;
                Ok(ExecResult::Continue)
            }
            Statement::For {
                target,
                iterable,
                body,
            } => {
                let iterable = self.eval_expression(iterable, environment)?;
                // Lists are walked by position so mutation inside the body is seen.
                let snapshot = match &iterable {
                    Value::List(_) => Vec::new(),
                    other => ops::iterate(other)?,
                };
                let mut position = 0;
                loop {
                    let item = match &iterable {
                        Value::List(list) => list.borrow().get(position).cloned(),
                        _ => snapshot.get(position).cloned(),
                    };
                    let Some(item) = item else {
                        break;
                    };
                    position += 1;
                    self.assign(target, item, environment)?;
                    match self.exec_block(body, environment)? {
                        ExecResult::Break => break,
                        ExecResult::Return(value) => return Ok(ExecResult::Return(value)),
                        ExecResult::Continue | ExecResult::NextIteration => {}
                    }
                }
                Ok(ExecResult::Continue)
            }
            Statement::While { condition, body } => {
                while self.eval_expression(condition, environment)?.is_truthy() {
                    match self.exec_block(body, environment)? {
                        ExecResult::Break => break,
                        ExecResult::Return(value) => return Ok(ExecResult::Return(value)),
                        ExecResult::Continue | ExecResult::NextIteration => {}
                    }
                }
                Ok(ExecResult::Continue)
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = self.eval_expression(condition, environment)?;
                let body = if condition.is_truthy() {
                    then_body
                } else {
                    else_body
                };
                self.exec_block(body, environment)
            }
            Statement::Return(value) => {
                let value = if let Some(value) = value {
                    self.eval_expression(value, environment)?
                } else {
                    Value::None
                };
                Ok(ExecResult::Return(value))
            }
            Statement::Pass => Ok(ExecResult::Continue),
            Statement::Break => Ok(ExecResult::Break),
            Statement::Continue => Ok(ExecResult::NextIteration),
            Statement::Expr(expr) => {
                self.eval_expression(expr, environment)?;
                Ok(ExecResult::Continue)
            }
        }
    }

    fn assign(
        &mut self,
        target: &AssignTarget,
        value: Value,
        environment: &mut Environment<'_>,
    ) -> Result<(), InterpreterError> {
        match target {
            AssignTarget::Name(name) => {
                environment.store(name, value);
                Ok(())
            }
            AssignTarget::Tuple(targets) => {
                let items = ops::iterate(&value)?;
                if items.len() != targets.len() {
                    return Err(RuntimeError::UnpackMismatch {
                        expected: targets.len(),
                        found: items.len(),
                    }
                    .into());
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, environment)?;
                }
                Ok(())
            }
            AssignTarget::Index { object, index } => {
                let object = self.eval_expression(object, environment)?;
                let index = self.eval_expression(index, environment)?;
                ops::store_index(&object, &index, value)?;
                Ok(())
            }
            AssignTarget::Attribute { object, name } => {
                let object = self.eval_expression(object, environment)?;
                Err(RuntimeError::UnknownAttribute {
                    attribute: name.clone(),
                    type_name: object.type_name().to_string(),
                }
                .into())
            }
        }
    }

    pub(super) fn eval_expression(
        &mut self,
        expr: &Expression,
        environment: &mut Environment<'_>,
    ) -> Result<Value, InterpreterError> {
        match expr {
            Expression::Integer(value) => Ok(Value::Integer(*value)),
            Expression::Float(value) => Ok(Value::Float(*value)),
            Expression::Boolean(value) => Ok(Value::Boolean(*value)),
            Expression::String(value) => Ok(Value::Str(value.clone())),
            Expression::None => Ok(Value::None),
            Expression::Identifier(name) => environment.load(name),
            Expression::List(elements) => Ok(Value::list(self.eval_all(elements, environment)?)),
            Expression::Tuple(elements) => Ok(Value::Tuple(self.eval_all(elements, environment)?)),
            Expression::Dict(_) | Expression::Set(_) => Err(RuntimeError::NotSupported {
                feature: "dict and set displays".to_string(),
            }
            .into()),
            Expression::Index { object, index } => {
                let object = self.eval_expression(object, environment)?;
                let index = self.eval_expression(index, environment)?;
                Ok(ops::index(&object, &index)?)
            }
            Expression::Attribute { object, name } => {
                let object = self.eval_expression(object, environment)?;
                Err(RuntimeError::UnknownAttribute {
                    attribute: name.clone(),
                    type_name: object.type_name().to_string(),
                }
                .into())
            }
            Expression::UnaryOp { op, operand } => {
                let operand = self.eval_expression(operand, environment)?;
                Ok(ops::unary(*op, &operand)?)
            }
            Expression::BinaryOp { left, op, right } => {
                let left = self.eval_expression(left, environment)?;
                let right = self.eval_expression(right, environment)?;
                Ok(ops::binary(*op, &left, &right)?)
            }
            Expression::BoolOp { op, values } => {
                let mut result = Value::None;
                for value in values {
                    result = self.eval_expression(value, environment)?;
                    let decided = match op {
                        BoolOperator::And => !result.is_truthy(),
                        BoolOperator::Or => result.is_truthy(),
                    };
                    if decided {
                        break;
                    }
                }
                Ok(result)
            }
            Expression::Compare {
                left,
                ops: operators,
                comparators,
            } => {
                let mut current = self.eval_expression(left, environment)?;
                for (op, comparator) in operators.iter().zip(comparators) {
                    let next = self.eval_expression(comparator, environment)?;
                    if !ops::compare(*op, &current, &next)? {
                        return Ok(Value::Boolean(false));
                    }
                    current = next;
                }
                Ok(Value::Boolean(true))
            }
            Expression::Call { callee, args } => self.eval_call(callee, args, environment),
            Expression::Yield(value) => {
                let value = match value {
                    Some(value) => self.eval_expression(value, environment)?,
                    None => Value::None,
                };
                self.yields.push(value);
                Ok(Value::None)
            }
        }
    }

    fn eval_all(
        &mut self,
        elements: &[Expression],
        environment: &mut Environment<'_>,
    ) -> Result<Vec<Value>, InterpreterError> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.eval_expression(element, environment)?);
        }
        Ok(values)
    }

    fn eval_call(
        &mut self,
        callee: &Expression,
        args: &[Expression],
        environment: &mut Environment<'_>,
    ) -> Result<Value, InterpreterError> {
        if let Expression::Attribute { object, name } = callee {
            let receiver = self.eval_expression(object, environment)?;
            let args = self.eval_all(args, environment)?;
            return call_method(&receiver, name, args);
        }
        let callee = self.eval_expression(callee, environment)?;
        let args = self.eval_all(args, environment)?;
        match callee {
            Value::Builtin(BuiltinFunction::Print) => {
                let outputs = args.iter().map(Value::to_output).collect::<Vec<_>>();
                self.output.push(outputs.join(" "));
                Ok(Value::None)
            }
            Value::Builtin(builtin) => Ok(builtin.call(&args)?),
            Value::Native(native) => Ok(native.call(&args)?),
            other => Err(RuntimeError::ObjectNotCallable {
                type_name: other.type_name().to_string(),
            }
            .into()),
        }
    }
}

fn call_method(receiver: &Value, method: &str, args: Vec<Value>) -> Result<Value, InterpreterError> {
    let expect = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(InterpreterError::MethodArityMismatch {
                method: method.to_string(),
                expected,
                found: args.len(),
            })
        }
    };
    match (receiver, method) {
        (Value::List(list), "append") => {
            expect(1)?;
            list.borrow_mut().extend(args);
            Ok(Value::None)
        }
        (Value::List(list), "extend") => {
            expect(1)?;
            let items = ops::iterate(&args[0])?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        (Value::List(list), "pop") => {
            expect(0)?;
            list.borrow_mut().pop().ok_or_else(|| {
                RuntimeError::EmptySequence {
                    operation: "pop".to_string(),
                }
                .into()
            })
        }
        (Value::List(_) | Value::Tuple(_), "index") => {
            expect(1)?;
            ops::iterate(receiver)?
                .iter()
                .position(|item| ops::equals(item, &args[0]))
                .map(|position| Value::Integer(position as i64))
                .ok_or_else(|| {
                    RuntimeError::Native {
                        name: "index".to_string(),
                        message: format!("{} is not in {}", args[0].repr(), receiver.type_name()),
                    }
                    .into()
                })
        }
        (Value::List(_) | Value::Tuple(_), "count") => {
            expect(1)?;
            let count = ops::iterate(receiver)?
                .iter()
                .filter(|item| ops::equals(item, &args[0]))
                .count();
            Ok(Value::Integer(count as i64))
        }
        (Value::Str(text), "upper") => {
            expect(0)?;
            Ok(Value::Str(text.to_uppercase()))
        }
        (Value::Str(text), "lower") => {
            expect(0)?;
            Ok(Value::Str(text.to_lowercase()))
        }
        (Value::Str(separator), "join") => {
            expect(1)?;
            let mut parts = Vec::new();
            for item in ops::iterate(&args[0])? {
                match item {
                    Value::Str(part) => parts.push(part),
                    other => {
                        return Err(RuntimeError::InvalidArgumentType {
                            operation: "join".to_string(),
                            expected: "str".to_string(),
                            got: other.type_name().to_string(),
                        }
                        .into());
                    }
                }
            }
            Ok(Value::Str(parts.join(separator)))
        }
        _ => Err(InterpreterError::UnknownMethod {
            method: method.to_string(),
            type_name: receiver.type_name().to_string(),
        }),
    }
}
