//! Compile-time rewrite passes over a single function definition.
//!
//! Each pass walks the function once with a [`env::Environment`] tracking
//! which names hold values known at transform time, and returns the rewritten
//! definition together with the bindings the new tree relies on. Passes are
//! stacked through a [`pipeline::Pipeline`].

use crate::ast::FunctionDef;
use crate::runtime::Bindings;

pub mod collapse;
pub mod config;
pub mod deindex;
pub mod env;
pub mod error;
pub mod eval;
pub mod pipeline;
pub mod rewrite;
pub mod unroll;

pub use collapse::CollapseLiterals;
pub use config::{PassConfig, PipelineConfig};
pub use deindex::Deindex;
pub use error::{ConfigError, PragmaError};
pub use pipeline::{Pipeline, PipelineOutput, Transformed};
pub use unroll::Unroll;

/// Output of one pass.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub function: FunctionDef,
    /// Names the rewritten tree needs beyond the enclosing scope.
    pub bindings: Bindings,
}

pub trait Pass {
    fn name(&self) -> &'static str;

    /// Whether the caller wants rendered source rather than a callable.
    fn emit_source(&self) -> bool;

    /// Rewrites `def` as seen from an enclosing scope holding `scope`.
    fn transform(&self, def: &FunctionDef, scope: &Bindings) -> Result<Rewrite, PragmaError>;
}
