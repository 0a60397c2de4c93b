//! Transform-time evaluation of expressions under an [`Environment`].

use log::{trace, warn};

use crate::ast::{BoolOperator, Expression};
use crate::builtins::BuiltinFunction;
use crate::runtime::error::RuntimeError;
use crate::runtime::{Value, ops};
use crate::unparse;

use super::env::{Environment, Knowledge};
use super::error::{PragmaError, Unsupported};

/// Folds `expression` to a concrete value.
///
/// `Ok(None)` means the expression cannot be folded and must be left alone.
/// Operator failures such as `1 + '2'` are logged and treated as unfoldable,
/// since the code may never run. A whitelisted builtin failing on known
/// arguments is an error.
pub fn fold(expression: &Expression, env: &Environment) -> Result<Option<Value>, PragmaError> {
    let value = match expression {
        Expression::Integer(value) => Value::Integer(*value),
        Expression::Float(value) => Value::Float(*value),
        Expression::Boolean(value) => Value::Boolean(*value),
        Expression::String(value) => Value::Str(value.clone()),
        Expression::None => Value::None,
        Expression::Identifier(name) => match resolve_name(name, env) {
            Some(value) => value,
            None => return Ok(None),
        },
        Expression::List(elements) => match fold_all(elements, env)? {
            Some(values) => Value::list(values),
            None => return Ok(None),
        },
        Expression::Tuple(elements) => match fold_all(elements, env)? {
            Some(values) => Value::Tuple(values),
            None => return Ok(None),
        },
        Expression::Dict(_) | Expression::Set(_) => {
            trace!("Not folding {}", Unsupported::DictOrSet);
            return Ok(None);
        }
        Expression::UnaryOp { op, operand } => {
            let Some(operand) = fold(operand, env)? else {
                return Ok(None);
            };
            return Ok(tolerate(expression, ops::unary(*op, &operand)));
        }
        Expression::BinaryOp { left, op, right } => {
            let Some(left) = fold(left, env)? else {
                return Ok(None);
            };
            let Some(right) = fold(right, env)? else {
                return Ok(None);
            };
            return Ok(tolerate(expression, ops::binary(*op, &left, &right)));
        }
        Expression::BoolOp { op, values } => return fold_bool_op(*op, values, env),
        Expression::Compare {
            left,
            ops: operators,
            comparators,
        } => {
            let Some(mut current) = fold(left, env)? else {
                return Ok(None);
            };
            for (op, comparator) in operators.iter().zip(comparators) {
                let Some(next) = fold(comparator, env)? else {
                    return Ok(None);
                };
                match tolerate(expression, ops::compare(*op, &current, &next)) {
                    Some(true) => current = next,
                    Some(false) => return Ok(Some(Value::Boolean(false))),
                    None => return Ok(None),
                }
            }
            Value::Boolean(true)
        }
        Expression::Index { object, index } => {
            let Some(object) = fold(object, env)? else {
                return Ok(None);
            };
            let Some(index) = fold(index, env)? else {
                return Ok(None);
            };
            return Ok(tolerate(expression, ops::index(&object, &index)));
        }
        Expression::Call { callee, args } => return fold_call(callee, args, env),
        Expression::Attribute { .. } | Expression::Yield(_) => return Ok(None),
    };
    Ok(Some(value))
}

/// Resolves a name to a known value, falling back to an unshadowed builtin.
pub fn resolve_name(name: &str, env: &Environment) -> Option<Value> {
    match env.get(name) {
        Some(Knowledge::Known(value)) => Some(value.clone()),
        Some(Knowledge::Unknown) => None,
        None => BuiltinFunction::from_name(name).map(Value::Builtin),
    }
}

/// The builtin a callee refers to, if it is one.
pub fn resolve_builtin(callee: &Expression, env: &Environment) -> Option<BuiltinFunction> {
    match callee {
        Expression::Identifier(name) => match resolve_name(name, env) {
            Some(Value::Builtin(builtin)) => Some(builtin),
            _ => None,
        },
        _ => None,
    }
}

fn fold_all(elements: &[Expression], env: &Environment) -> Result<Option<Vec<Value>>, PragmaError> {
    let mut values = Vec::with_capacity(elements.len());
    for element in elements {
        match fold(element, env)? {
            Some(value) => values.push(value),
            None => return Ok(None),
        }
    }
    Ok(Some(values))
}

/// `and`/`or` yield the deciding operand, so an unknown tail is fine once an
/// earlier operand decides the result.
fn fold_bool_op(
    op: BoolOperator,
    values: &[Expression],
    env: &Environment,
) -> Result<Option<Value>, PragmaError> {
    let mut result = None;
    for value in values {
        let Some(value) = fold(value, env)? else {
            return Ok(None);
        };
        let decided = match op {
            BoolOperator::And => !value.is_truthy(),
            BoolOperator::Or => value.is_truthy(),
        };
        result = Some(value);
        if decided {
            break;
        }
    }
    Ok(result)
}

fn fold_call(
    callee: &Expression,
    args: &[Expression],
    env: &Environment,
) -> Result<Option<Value>, PragmaError> {
    let Some(builtin) = resolve_builtin(callee, env) else {
        return Ok(None);
    };
    if !builtin.is_pure() {
        return Ok(None);
    }
    let Some(args) = fold_all(args, env)? else {
        return Ok(None);
    };
    builtin
        .call(&args)
        .map(Some)
        .map_err(PragmaError::Evaluation)
}

fn tolerate<T>(expression: &Expression, result: Result<T, RuntimeError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(
                "Cannot fold `{}`: {error}",
                unparse::render_expression(expression)
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::ast::Statement;

    fn expression(source: &str) -> Expression {
        match parser::parse(source)
            .expect("parse failed")
            .statements
            .into_iter()
            .next()
        {
            Some(Statement::Expr(expression)) => expression,
            other => panic!("expected an expression, got {other:?}"),
        }
    }

    fn fold_source(source: &str, env: &Environment) -> Result<Option<Value>, PragmaError> {
        fold(&expression(source), env)
    }

    fn env_with(bindings: &[(&str, Option<Value>)]) -> Environment {
        let mut env = Environment::new();
        for (name, value) in bindings {
            env.observe_assignment(name, value.clone());
        }
        env
    }

    #[test]
    fn folds_arithmetic_with_host_semantics() {
        let env = Environment::new();
        assert_eq!(fold_source("1 + 2 * 3", &env).unwrap(), Some(Value::Integer(7)));
        assert_eq!(fold_source("7 // -2", &env).unwrap(), Some(Value::Integer(-4)));
        assert_eq!(fold_source("1 / 2", &env).unwrap(), Some(Value::Float(0.5)));
        assert_eq!(fold_source("1 < 2 < 3", &env).unwrap(), Some(Value::Boolean(true)));
        assert_eq!(fold_source("(1, 2)", &env).unwrap(), Some(Value::Tuple(vec![Value::Integer(1), Value::Integer(2)])));
    }

    #[test]
    fn uses_known_names_and_skips_unknown_ones() {
        let env = env_with(&[("x", Some(Value::Integer(3))), ("y", None)]);
        assert_eq!(fold_source("x + 2", &env).unwrap(), Some(Value::Integer(5)));
        assert_eq!(fold_source("x + y", &env).unwrap(), None);
        assert_eq!(fold_source("undefined_name", &env).unwrap(), None);
    }

    #[test]
    fn bool_ops_short_circuit_on_the_deciding_operand() {
        let env = env_with(&[("y", None)]);
        assert_eq!(fold_source("0 and y", &env).unwrap(), Some(Value::Integer(0)));
        assert_eq!(fold_source("'a' or y", &env).unwrap(), Some(Value::Str("a".to_string())));
        assert_eq!(fold_source("1 and y", &env).unwrap(), None);
        assert_eq!(fold_source("1 > 2 < y", &env).unwrap(), Some(Value::Boolean(false)));
    }

    #[test]
    fn folds_only_whitelisted_calls() {
        let env = env_with(&[("items", Some(Value::list(vec![Value::Integer(4), Value::Integer(9)])))]);
        assert_eq!(fold_source("len(items)", &env).unwrap(), Some(Value::Integer(2)));
        assert_eq!(fold_source("max(items)", &env).unwrap(), Some(Value::Integer(9)));
        assert_eq!(fold_source("items[-1]", &env).unwrap(), Some(Value::Integer(9)));
        assert_eq!(fold_source("print(1)", &env).unwrap(), None);
        assert_eq!(fold_source("object()", &env).unwrap(), None);
        assert_eq!(fold_source("reversed(items)", &env).unwrap(), None);
        assert!(matches!(
            fold_source("range(3)", &env).unwrap(),
            Some(Value::Range(_))
        ));
    }

    #[test]
    fn shadowed_builtins_do_not_fold() {
        let env = env_with(&[("len", None)]);
        assert_eq!(fold_source("len((1, 2))", &env).unwrap(), None);

        let aliased = env_with(&[("a", Some(Value::Builtin(BuiltinFunction::Range)))]);
        assert!(matches!(fold_source("a(3)", &aliased).unwrap(), Some(Value::Range(_))));
    }

    #[test]
    fn builtin_failures_abort_but_operator_failures_do_not() {
        let env = Environment::new();
        assert!(matches!(
            fold_source("range(0, 3, 0)", &env),
            Err(PragmaError::Evaluation(RuntimeError::RangeStepZero))
        ));
        assert!(matches!(
            fold_source("len(3)", &env),
            Err(PragmaError::Evaluation(RuntimeError::NoLength { .. }))
        ));
        assert_eq!(fold_source("1 + '2'", &env).unwrap(), None);
        assert_eq!(fold_source("1 // 0", &env).unwrap(), None);
    }

    #[test]
    fn dicts_and_sets_never_fold() {
        let env = Environment::new();
        assert_eq!(fold_source("{1: 2}", &env).unwrap(), None);
        assert_eq!(fold_source("{1, 2}", &env).unwrap(), None);
        assert_eq!(fold_source("len({1, 2})", &env).unwrap(), None);
    }
}
