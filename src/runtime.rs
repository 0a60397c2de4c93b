//! Value model shared by the constant evaluator and the interpreter.
//!
//! Both sides go through [`ops`] so a folded expression and an executed one
//! agree on every operator.
pub mod error;
pub mod ops;
pub mod value;

pub use error::RuntimeError;
pub use value::{ListRef, NativeFunction, Opaque, RangeValue, Value};

/// Ordered name to value mapping used for enclosing scopes and closure state.
pub type Bindings = indexmap::IndexMap<String, Value>;
