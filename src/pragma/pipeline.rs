use log::debug;

use crate::acquire::AcquiredFunction;
use crate::ast::FunctionDef;
use crate::interpreter::{self, CompiledFunction};
use crate::runtime::Bindings;
use crate::unparse;

use super::config::PipelineConfig;
use super::error::{ConfigError, PragmaError};
use super::Pass;

/// Passes applied in order, each to the previous pass's output.
#[derive(Default)]
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn push(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let mut pipeline = Self::new();
        for pass in &config.passes {
            pipeline.push(pass.build()?);
        }
        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Only the last pass may ask for source output.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let last = self.passes.len().saturating_sub(1);
        match self
            .passes
            .iter()
            .enumerate()
            .find(|(position, pass)| pass.emit_source() && *position != last)
        {
            Some((position, pass)) => Err(ConfigError::EmitSourceNotLast {
                pass: pass.name().to_string(),
                position,
            }),
            None => Ok(()),
        }
    }

    pub fn apply(&self, function: &AcquiredFunction) -> Result<Transformed, PragmaError> {
        self.validate()?;
        let mut def = function.def.clone();
        let mut scope = function.scope.clone();
        let mut auxiliary = Bindings::new();
        for pass in &self.passes {
            debug!("Applying {} to '{}'", pass.name(), def.name);
            let rewrite = pass.transform(&def, &scope)?;
            def = rewrite.function;
            for (name, value) in rewrite.bindings {
                scope.insert(name.clone(), value.clone());
                auxiliary.insert(name, value);
            }
        }
        Ok(Transformed {
            function: def,
            auxiliary,
            scope,
            baseline: function.baseline.clone(),
            emit_source: self.passes.last().is_some_and(|pass| pass.emit_source()),
        })
    }
}

/// Result of a whole pipeline.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub function: FunctionDef,
    /// Bindings introduced by the passes, in the order they appeared.
    pub auxiliary: Bindings,
    /// Enclosing scope plus the auxiliary bindings.
    pub scope: Bindings,
    pub baseline: String,
    pub emit_source: bool,
}

#[derive(Debug, Clone)]
pub enum PipelineOutput {
    Source(String),
    Callable(CompiledFunction),
}

impl Transformed {
    pub fn source(&self) -> String {
        unparse::render_function(&self.function)
    }

    /// Source indented back to where the function was found.
    pub fn source_at_baseline(&self) -> String {
        unparse::render_function_at(&self.function, &self.baseline)
    }

    pub fn compile(&self) -> Result<CompiledFunction, PragmaError> {
        Ok(interpreter::compile(&self.function, &self.scope)?)
    }

    pub fn output(&self) -> Result<PipelineOutput, PragmaError> {
        if self.emit_source {
            Ok(PipelineOutput::Source(self.source()))
        } else {
            self.compile().map(PipelineOutput::Callable)
        }
    }
}
