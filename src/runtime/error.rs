use thiserror::Error;

/// Errors raised by value operations, shared by constant folding and execution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Unsupported operand types for {operation}: '{left}' and '{right}'")]
    UnsupportedOperands {
        operation: String,
        left: String,
        right: String,
    },
    #[error("Bad operand type for unary {operation}: '{type_name}'")]
    UnsupportedUnary {
        operation: String,
        type_name: String,
    },
    #[error("'{operation}' not supported between instances of '{left}' and '{right}'")]
    NotComparable {
        operation: String,
        left: String,
        right: String,
    },
    #[error("Division by zero")]
    ZeroDivision,
    #[error("Integer overflow in {operation}")]
    Overflow { operation: String },
    #[error("Index out of range: index {index}, len {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("Indices must be integers, not {type_name}")]
    IndexType { type_name: String },
    #[error("Object of type {type_name} is not subscriptable")]
    NotSubscriptable { type_name: String },
    #[error("Object of type {type_name} does not support item assignment")]
    NotAssignable { type_name: String },
    #[error("Object of type {type_name} is not iterable")]
    NotIterable { type_name: String },
    #[error("Object of type {type_name} has no len()")]
    NoLength { type_name: String },
    #[error("range() arg 3 must not be zero")]
    RangeStepZero,
    #[error("{operation}() arg is an empty sequence")]
    EmptySequence { operation: String },
    #[error("Invalid argument type for '{operation}': expected {expected}, got {got}")]
    InvalidArgumentType {
        operation: String,
        expected: String,
        got: String,
    },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Object of type {type_name} is not callable")]
    ObjectNotCallable { type_name: String },
    #[error("Unknown attribute '{attribute}' for type {type_name}")]
    UnknownAttribute {
        attribute: String,
        type_name: String,
    },
    #[error("Cannot unpack {found} values into {expected} targets")]
    UnpackMismatch { expected: usize, found: usize },
    #[error("{feature} is not supported at runtime")]
    NotSupported { feature: String },
    #[error("Error in native function '{name}': {message}")]
    Native { name: String, message: String },
}
