//! Operator semantics over [`Value`], shared by the constant evaluator and the
//! interpreter so a folded expression always agrees with executing it.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::{BinaryOperator, CompareOperator, UnaryOperator};

use super::error::RuntimeError;
use super::value::Value;

/// Upper bound on sequences built by repetition.
const MAX_REPEAT_LEN: usize = 1 << 20;

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Some(Number::Int(*n)),
            Value::Boolean(b) => Some(Number::Int(*b as i64)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Integer(n) => *n != 0,
        Value::Float(f) => *f != 0.0,
        Value::Boolean(b) => *b,
        Value::Str(s) => !s.is_empty(),
        Value::None => false,
        Value::Tuple(elements) => !elements.is_empty(),
        Value::List(list) => !list.borrow().is_empty(),
        Value::Range(range) => !range.is_empty(),
        Value::Builtin(_) | Value::Native(_) | Value::Opaque(_) => true,
    }
}

pub fn equals(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (Number::of(left), Number::of(right)) {
        return match (l, r) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        };
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::None, Value::None) => true,
        (Value::Tuple(a), Value::Tuple(b)) => sequences_equal(a, b),
        (Value::List(a), Value::List(b)) => {
            Rc::ptr_eq(a, b) || sequences_equal(&a.borrow(), &b.borrow())
        }
        (Value::Range(a), Value::Range(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
        }
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        (Value::Native(a), Value::Native(b)) => a.same_function(b),
        (Value::Opaque(a), Value::Opaque(b)) => a.id() == b.id(),
        _ => false,
    }
}

fn sequences_equal(left: &[Value], right: &[Value]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(a, b)| equals(a, b))
}

/// Python `is`. Immutable scalars compare by value.
pub fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
        (Value::Integer(_) | Value::Boolean(_) | Value::Float(_), _)
        | (_, Value::Integer(_) | Value::Boolean(_) | Value::Float(_)) => false,
        _ => equals(left, right),
    }
}

pub fn unary(op: UnaryOperator, operand: &Value) -> Result<Value, RuntimeError> {
    if op == UnaryOperator::Not {
        return Ok(Value::Boolean(!truthy(operand)));
    }
    let symbol = if op == UnaryOperator::Neg { "-" } else { "+" };
    match (op, Number::of(operand)) {
        (UnaryOperator::Neg, Some(Number::Int(n))) => n
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| overflow(symbol)),
        (UnaryOperator::Neg, Some(Number::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOperator::Pos, Some(Number::Int(n))) => Ok(Value::Integer(n)),
        (UnaryOperator::Pos, Some(Number::Float(f))) => Ok(Value::Float(f)),
        _ => Err(RuntimeError::UnsupportedUnary {
            operation: symbol.to_string(),
            type_name: operand.type_name().to_string(),
        }),
    }
}

pub fn binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if let (Some(l), Some(r)) = (Number::of(left), Number::of(right)) {
        return match (l, r) {
            (Number::Int(a), Number::Int(b)) => integer_binary(op, a, b),
            (a, b) => float_binary(op, a.as_f64(), b.as_f64()),
        };
    }
    match (op, left, right) {
        (BinaryOperator::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (BinaryOperator::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::Tuple(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOperator::Add, Value::List(a), Value::List(b)) => {
            let joined = a.borrow().iter().chain(b.borrow().iter()).cloned().collect();
            Ok(Value::list(joined))
        }
        (BinaryOperator::Mul, sequence, count) | (BinaryOperator::Mul, count, sequence)
            if is_sequence(sequence) && count.as_index().is_some() =>
        {
            repeat(sequence, count.as_index().unwrap_or(0))
        }
        _ => Err(RuntimeError::UnsupportedOperands {
            operation: op.symbol().to_string(),
            left: left.type_name().to_string(),
            right: right.type_name().to_string(),
        }),
    }
}

fn is_sequence(value: &Value) -> bool {
    matches!(value, Value::Str(_) | Value::Tuple(_) | Value::List(_))
}

fn repeat(sequence: &Value, count: i64) -> Result<Value, RuntimeError> {
    let count = usize::try_from(count).unwrap_or(0);
    let unit = len(sequence)?;
    if unit.checked_mul(count).is_none_or(|total| total > MAX_REPEAT_LEN) {
        return Err(overflow("*"));
    }
    Ok(match sequence {
        Value::Str(s) => Value::Str(s.repeat(count)),
        Value::Tuple(elements) => Value::Tuple(repeated(elements, count)),
        Value::List(list) => Value::list(repeated(&list.borrow(), count)),
        other => {
            return Err(RuntimeError::UnsupportedOperands {
                operation: "*".to_string(),
                left: other.type_name().to_string(),
                right: "int".to_string(),
            });
        }
    })
}

fn repeated(elements: &[Value], count: usize) -> Vec<Value> {
    (0..count).flat_map(|_| elements.iter().cloned()).collect()
}

fn integer_binary(op: BinaryOperator, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let symbol = op.symbol();
    let result = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Sub => a.checked_sub(b),
        BinaryOperator::Mul => a.checked_mul(b),
        BinaryOperator::Div => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision);
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOperator::FloorDiv => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision);
            }
            a.checked_div(b).map(|q| {
                if (a % b != 0) && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinaryOperator::Mod => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision);
            }
            a.checked_rem(b).map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        BinaryOperator::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(RuntimeError::ZeroDivision);
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp))
        }
    };
    result.map(Value::Integer).ok_or_else(|| overflow(symbol))
}

fn float_binary(op: BinaryOperator, a: f64, b: f64) -> Result<Value, RuntimeError> {
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div | BinaryOperator::FloorDiv | BinaryOperator::Mod if b == 0.0 => {
            return Err(RuntimeError::ZeroDivision);
        }
        BinaryOperator::Div => a / b,
        BinaryOperator::FloorDiv => (a / b).floor(),
        BinaryOperator::Mod => {
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
        }
        BinaryOperator::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(RuntimeError::ZeroDivision);
            }
            let power = a.powf(b);
            if power.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(overflow("**"));
            }
            power
        }
    };
    Ok(Value::Float(result))
}

/// Evaluates one link of a comparison chain.
pub fn compare(op: CompareOperator, left: &Value, right: &Value) -> Result<bool, RuntimeError> {
    match op {
        CompareOperator::Eq => Ok(equals(left, right)),
        CompareOperator::NotEq => Ok(!equals(left, right)),
        CompareOperator::Is => Ok(identical(left, right)),
        CompareOperator::IsNot => Ok(!identical(left, right)),
        CompareOperator::In => contains(right, left),
        CompareOperator::NotIn => contains(right, left).map(|found| !found),
        CompareOperator::Lt | CompareOperator::LtE | CompareOperator::Gt | CompareOperator::GtE => {
            let Some(ordering) = order(op, left, right)? else {
                return Ok(false);
            };
            Ok(match op {
                CompareOperator::Lt => ordering == Ordering::Less,
                CompareOperator::LtE => ordering != Ordering::Greater,
                CompareOperator::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// `None` when the operands are unordered (NaN).
fn order(
    op: CompareOperator,
    left: &Value,
    right: &Value,
) -> Result<Option<Ordering>, RuntimeError> {
    if let (Some(l), Some(r)) = (Number::of(left), Number::of(right)) {
        return Ok(match (l, r) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        });
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Tuple(a), Value::Tuple(b)) => order_sequences(op, a, b),
        (Value::List(a), Value::List(b)) => order_sequences(op, &a.borrow(), &b.borrow()),
        _ => Err(RuntimeError::NotComparable {
            operation: op.symbol().to_string(),
            left: left.type_name().to_string(),
            right: right.type_name().to_string(),
        }),
    }
}

fn order_sequences(
    op: CompareOperator,
    left: &[Value],
    right: &[Value],
) -> Result<Option<Ordering>, RuntimeError> {
    for (a, b) in left.iter().zip(right) {
        if !equals(a, b) {
            return order(op, a, b);
        }
    }
    Ok(Some(left.len().cmp(&right.len())))
}

fn contains(container: &Value, item: &Value) -> Result<bool, RuntimeError> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Str(_), other) => Err(RuntimeError::InvalidArgumentType {
            operation: "in".to_string(),
            expected: "str".to_string(),
            got: other.type_name().to_string(),
        }),
        (Value::Range(range), candidate) => Ok(match Number::of(candidate) {
            Some(Number::Int(n)) => range.iter().any(|element| element == n),
            Some(Number::Float(f)) => range.iter().any(|element| element as f64 == f),
            None => false,
        }),
        _ => Ok(iterate(container)?.iter().any(|element| equals(element, item))),
    }
}

/// Maps a possibly negative index onto `0..len`.
pub fn normalize_index(index: i64, len: usize) -> Result<usize, RuntimeError> {
    let resolved = if index < 0 {
        index.checked_add(len as i64)
    } else {
        Some(index)
    };
    match resolved {
        Some(position) if position >= 0 && (position as usize) < len => Ok(position as usize),
        _ => Err(RuntimeError::IndexOutOfRange { index, len }),
    }
}

fn integer_index(index: &Value) -> Result<i64, RuntimeError> {
    index.as_index().ok_or_else(|| RuntimeError::IndexType {
        type_name: index.type_name().to_string(),
    })
}

pub fn index(object: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match object {
        Value::List(list) => {
            let list = list.borrow();
            let position = normalize_index(integer_index(index)?, list.len())?;
            Ok(list[position].clone())
        }
        Value::Tuple(elements) => {
            let position = normalize_index(integer_index(index)?, elements.len())?;
            Ok(elements[position].clone())
        }
        Value::Str(s) => {
            let chars = s.chars().collect::<Vec<_>>();
            let position = normalize_index(integer_index(index)?, chars.len())?;
            Ok(Value::Str(chars[position].to_string()))
        }
        Value::Range(range) => {
            let position = normalize_index(integer_index(index)?, range.len())?;
            range
                .get(position)
                .map(Value::Integer)
                .ok_or(RuntimeError::IndexOutOfRange {
                    index: position as i64,
                    len: range.len(),
                })
        }
        other => Err(RuntimeError::NotSubscriptable {
            type_name: other.type_name().to_string(),
        }),
    }
}

pub fn store_index(object: &Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
    match object {
        Value::List(list) => {
            let mut list = list.borrow_mut();
            let position = normalize_index(integer_index(index)?, list.len())?;
            list[position] = value;
            Ok(())
        }
        other => Err(RuntimeError::NotAssignable {
            type_name: other.type_name().to_string(),
        }),
    }
}

pub fn iterate(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::List(list) => Ok(list.borrow().clone()),
        Value::Tuple(elements) => Ok(elements.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Range(range) => Ok(range.iter().map(Value::Integer).collect()),
        other => Err(RuntimeError::NotIterable {
            type_name: other.type_name().to_string(),
        }),
    }
}

pub fn len(value: &Value) -> Result<usize, RuntimeError> {
    match value {
        Value::List(list) => Ok(list.borrow().len()),
        Value::Tuple(elements) => Ok(elements.len()),
        Value::Str(s) => Ok(s.chars().count()),
        Value::Range(range) => Ok(range.len()),
        other => Err(RuntimeError::NoLength {
            type_name: other.type_name().to_string(),
        }),
    }
}

fn overflow(operation: &str) -> RuntimeError {
    RuntimeError::Overflow {
        operation: operation.to_string(),
    }
}
