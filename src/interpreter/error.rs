use thiserror::Error;

use crate::runtime::error::RuntimeError;

/// Typed errors produced while executing a compiled function.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    FunctionArityMismatch {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("Method '{method}' expected {expected} arguments, got {found}")]
    MethodArityMismatch {
        method: String,
        expected: usize,
        found: usize,
    },
    #[error("Unknown method '{method}' for type {type_name}")]
    UnknownMethod { method: String, type_name: String },
    #[error("Local variable '{name}' referenced before assignment")]
    UnboundLocal { name: String },
}

/// Validation failures raised while turning a rewritten tree back into a callable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecompilationError {
    #[error("Duplicate parameter '{name}' in function '{function}'")]
    DuplicateParameter { name: String, function: String },
    #[error("Non-default parameter '{name}' follows a default parameter in '{function}'")]
    NonDefaultAfterDefault { name: String, function: String },
    #[error("'{statement}' outside loop in function '{function}'")]
    OutsideLoop {
        statement: &'static str,
        function: String,
    },
    #[error("Nested function definition '{name}' is not supported")]
    NestedFunctionDefinition { name: String },
    #[error("Default for parameter '{param}' failed to evaluate: {source}")]
    DefaultEvaluation {
        param: String,
        #[source]
        source: InterpreterError,
    },
}
