use std::fmt;

use thiserror::Error;

use crate::acquire::AcquireError;
use crate::interpreter::RecompilationError;
use crate::parser::ParseError;
use crate::runtime::error::RuntimeError;

/// Invalid pass options or a pass stack that cannot be applied.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Binding name '{name}' is a parameter or local of '{function}'")]
    BindingIsLocal { name: String, function: String },
    #[error("Synthetic name '{name}' already appears in '{function}'")]
    NameCollision { name: String, function: String },
    #[error("Deindex target must be a list, tuple, range or str, got {type_name}")]
    NotASequence { type_name: String },
    #[error("Pass '{pass}' at position {position} emits source but is not the last pass")]
    EmitSourceNotLast { pass: String, position: usize },
    #[error("Unknown pass '{name}'")]
    UnknownPass { name: String },
    #[error("Unknown builtin '{name}' in binding")]
    UnknownBuiltin { name: String },
    #[error("Pass '{pass}' requires option '{option}'")]
    MissingOption { pass: String, option: String },
    #[error("Invalid pass configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum PragmaError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] RuntimeError),
    #[error(transparent)]
    Recompilation(#[from] RecompilationError),
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Constructs a pass leaves untouched. Reported through `debug!`, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    DictOrSet,
    TupleTarget,
    LoopControl,
    IteratorCombinator,
    UnknownIterable,
    NonLiteralElement,
    ReboundTarget,
    MutatedIterable,
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Unsupported::DictOrSet => "dict or set display",
            Unsupported::TupleTarget => "tuple-unpacking loop target",
            Unsupported::LoopControl => "break or continue in loop body",
            Unsupported::IteratorCombinator => "zip/reversed/enumerate iterable",
            Unsupported::UnknownIterable => "iterable not known at transform time",
            Unsupported::NonLiteralElement => "element without literal syntax",
            Unsupported::ReboundTarget => "loop variable rebound in loop body",
            Unsupported::MutatedIterable => "iterable mutated in loop body",
        };
        f.write_str(description)
    }
}
