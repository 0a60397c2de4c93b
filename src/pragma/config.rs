//! Serialized pass stacks.
//!
//! ```yaml
//! passes:
//!   - unroll: { bindings: { n: 3 } }
//!   - deindex: { target: [1, 2, 3], binding_name: v }
//!   - collapse_literals: { emit_source: true }
//! ```

use indexmap::IndexMap;
use serde::Deserialize;

use crate::builtins::BuiltinFunction;
use crate::runtime::{Bindings, Value};

use super::error::ConfigError;
use super::pipeline::Pipeline;
use super::{CollapseLiterals, Deindex, Pass, Unroll};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub passes: Vec<PassConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassConfig {
    Unroll(UnrollOptions),
    CollapseLiterals(CollapseOptions),
    Deindex(DeindexOptions),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnrollOptions {
    pub bindings: IndexMap<String, ConfigValue>,
    pub emit_source: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollapseOptions {
    pub bindings: IndexMap<String, ConfigValue>,
    pub emit_source: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeindexOptions {
    /// Defaults to whatever `binding_name` holds in the enclosing scope.
    #[serde(default)]
    pub target: Option<ConfigValue>,
    pub binding_name: String,
    #[serde(default)]
    pub emit_source: bool,
}

/// A value written in configuration. Plain YAML sequences become lists;
/// tuples and builtins are spelled as `{tuple: [..]}` and `{builtin: name}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    List(Vec<ConfigValue>),
    Tuple { tuple: Vec<ConfigValue> },
    Builtin { builtin: String },
}

impl ConfigValue {
    pub fn to_value(&self) -> Result<Value, ConfigError> {
        Ok(match self {
            ConfigValue::Null => Value::None,
            ConfigValue::Bool(value) => Value::Boolean(*value),
            ConfigValue::Integer(value) => Value::Integer(*value),
            ConfigValue::Float(value) => Value::Float(*value),
            ConfigValue::Str(value) => Value::Str(value.clone()),
            ConfigValue::List(values) => Value::list(to_values(values)?),
            ConfigValue::Tuple { tuple } => Value::Tuple(to_values(tuple)?),
            ConfigValue::Builtin { builtin } => {
                let function = BuiltinFunction::from_name(builtin).ok_or_else(|| {
                    ConfigError::UnknownBuiltin {
                        name: builtin.clone(),
                    }
                })?;
                Value::Builtin(function)
            }
        })
    }
}

fn to_values(values: &[ConfigValue]) -> Result<Vec<Value>, ConfigError> {
    values.iter().map(ConfigValue::to_value).collect()
}

fn to_bindings(bindings: &IndexMap<String, ConfigValue>) -> Result<Bindings, ConfigError> {
    bindings
        .iter()
        .map(|(name, value)| Ok((name.clone(), value.to_value()?)))
        .collect()
}

impl PipelineConfig {
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn build(&self) -> Result<Pipeline, ConfigError> {
        Pipeline::from_config(self)
    }
}

impl PassConfig {
    /// Default options for a pass named on the command line.
    pub fn named(name: &str) -> Result<Self, ConfigError> {
        match name {
            "unroll" => Ok(PassConfig::Unroll(UnrollOptions::default())),
            "collapse_literals" | "collapse-literals" => {
                Ok(PassConfig::CollapseLiterals(CollapseOptions::default()))
            }
            "deindex" => Err(ConfigError::MissingOption {
                pass: name.to_string(),
                option: "target".to_string(),
            }),
            _ => Err(ConfigError::UnknownPass {
                name: name.to_string(),
            }),
        }
    }

    pub fn emit_source(&self) -> bool {
        match self {
            PassConfig::Unroll(options) => options.emit_source,
            PassConfig::CollapseLiterals(options) => options.emit_source,
            PassConfig::Deindex(options) => options.emit_source,
        }
    }

    pub fn build(&self) -> Result<Box<dyn Pass>, ConfigError> {
        Ok(match self {
            PassConfig::Unroll(options) => Box::new(
                Unroll::new()
                    .with_bindings(to_bindings(&options.bindings)?)
                    .with_emit_source(options.emit_source),
            ),
            PassConfig::CollapseLiterals(options) => Box::new(
                CollapseLiterals::new()
                    .with_bindings(to_bindings(&options.bindings)?)
                    .with_emit_source(options.emit_source),
            ),
            PassConfig::Deindex(options) => {
                let pass = match &options.target {
                    Some(target) => Deindex::new(target.to_value()?, &options.binding_name),
                    None => Deindex::from_scope(&options.binding_name),
                };
                Box::new(pass.with_emit_source(options.emit_source))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn parses_a_pass_stack() {
        let config = PipelineConfig::from_yaml(indoc! {"
            passes:
              - unroll:
                  bindings:
                    a: { builtin: range }
                    n: 3
              - deindex:
                  target: [1, 2.5, 'x', null, { tuple: [true, 2] }]
                  binding_name: v
              - collapse_literals:
                  emit_source: true
        "})
        .expect("config failed");

        assert_eq!(config.passes.len(), 3);
        let PassConfig::Unroll(unroll) = &config.passes[0] else {
            panic!("expected unroll, got {:?}", config.passes[0]);
        };
        assert_eq!(
            unroll.bindings["a"],
            ConfigValue::Builtin {
                builtin: "range".to_string()
            }
        );
        let PassConfig::Deindex(deindex) = &config.passes[1] else {
            panic!("expected deindex, got {:?}", config.passes[1]);
        };
        assert_eq!(
            deindex
                .target
                .as_ref()
                .map(|target| target.to_value().expect("bad target").repr()),
            Some("[1, 2.5, 'x', None, (True, 2)]".to_string())
        );
        assert!(config.passes[2].emit_source());

        let pipeline = config.build().expect("build failed");
        assert_eq!(pipeline.len(), 3);
    }

    #[test]
    fn rejects_unknown_options() {
        let error = PipelineConfig::from_yaml(indoc! {"
            passes:
              - unroll:
                  unrol_depth: 2
        "})
        .expect_err("unknown option accepted");
        assert!(matches!(error, ConfigError::Yaml(_)));

        assert!(matches!(
            PipelineConfig::from_yaml("passes:\n  - inline: {}\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn names_passes_for_the_command_line() {
        assert!(matches!(PassConfig::named("unroll"), Ok(PassConfig::Unroll(_))));
        assert!(matches!(
            PassConfig::named("collapse-literals"),
            Ok(PassConfig::CollapseLiterals(_))
        ));
        assert!(matches!(
            PassConfig::named("deindex"),
            Err(ConfigError::MissingOption { .. })
        ));
        assert!(matches!(
            PassConfig::named("fuse"),
            Err(ConfigError::UnknownPass { .. })
        ));
    }

    #[test]
    fn rejects_unknown_builtins() {
        let value = ConfigValue::Builtin {
            builtin: "open".to_string(),
        };
        assert!(matches!(
            value.to_value(),
            Err(ConfigError::UnknownBuiltin { .. })
        ));
    }
}
