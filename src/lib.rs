pub mod acquire;
pub mod ast;
pub mod builtins;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod pragma;
pub mod runtime;
pub mod unparse;

pub use acquire::{AcquiredFunction, acquire};
pub use pragma::{
    CollapseLiterals, Deindex, Pass, Pipeline, PipelineConfig, PragmaError, Transformed, Unroll,
};
