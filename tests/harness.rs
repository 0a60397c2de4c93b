use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;
use std::path::Path;

use pragma::acquire::{AcquiredFunction, acquire};
use pragma::ast::BinaryOperator;
use pragma::interpreter::{self, CallOutcome};
use pragma::pragma::config::{ConfigValue, PassConfig, PipelineConfig};
use pragma::runtime::{Bindings, Opaque, Value, ops};
use test_support::{Case, CaseClass, CallSpec, load_cases, normalize_output};

/// Scope values a case can ask for beyond what pass configuration spells.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeValue {
    /// A list of distinct objects with no literal form.
    Objects { objects: usize },
    /// A list of callables, the k-th raising its argument to `powers[k]`.
    Powers { powers: Vec<i64> },
    Plain(ConfigValue),
}

impl ScopeValue {
    fn to_value(&self) -> Result<Value> {
        Ok(match self {
            ScopeValue::Objects { objects } => Value::list(
                (0..*objects)
                    .map(|_| Value::Opaque(Opaque::new("object")))
                    .collect(),
            ),
            ScopeValue::Powers { powers } => Value::list(
                powers
                    .iter()
                    .map(|&power| {
                        Value::native(&format!("power_{power}"), move |args: &[Value]| {
                            ops::binary(BinaryOperator::Pow, &args[0], &Value::Integer(power))
                        })
                    })
                    .collect(),
            ),
            ScopeValue::Plain(value) => value.to_value()?,
        })
    }
}

fn yaml_value(value: &serde_yaml::Value) -> Result<Value> {
    let value: ConfigValue = serde_yaml::from_value(value.clone())?;
    Ok(value.to_value()?)
}

fn case_scope(case: &Case) -> Result<Bindings> {
    let mut scope = Bindings::new();
    for (name, value) in &case.spec.scope {
        let name = name
            .as_str()
            .with_context(|| format!("Non-string scope name in {}", case.name))?;
        let value: ScopeValue = serde_yaml::from_value(value.clone())
            .with_context(|| format!("Scope value '{name}' in {}", case.name))?;
        scope.insert(name.to_string(), value.to_value()?);
    }
    Ok(scope)
}

/// The untransformed function sees what the passes were told about, too.
fn baseline_scope(scope: &Bindings, config: &PipelineConfig) -> Result<Bindings> {
    let mut scope = scope.clone();
    for pass in &config.passes {
        let bindings = match pass {
            PassConfig::Unroll(options) => &options.bindings,
            PassConfig::CollapseLiterals(options) => &options.bindings,
            PassConfig::Deindex(_) => continue,
        };
        for (name, value) in bindings {
            scope.insert(name.clone(), value.to_value()?);
        }
    }
    Ok(scope)
}

fn check_call(case: &Case, call: &CallSpec, original: &CallOutcome, actual: &CallOutcome) -> Result<()> {
    ensure!(
        original == actual,
        "Transformed function diverged for {} with {:?}: expected {original:?}, got {actual:?}",
        case.name,
        call.args
    );
    if let Some(returns) = &call.returns {
        let expected = yaml_value(returns)?;
        ensure!(
            actual.value == expected,
            "Expected {} to return {}, got {}",
            case.name,
            expected.repr(),
            actual.value.repr()
        );
    }
    if let Some(yields) = &call.yields {
        let expected = yields.iter().map(yaml_value).collect::<Result<Vec<_>>>()?;
        ensure!(
            actual.yields == expected,
            "Yield mismatch for {}: expected {expected:?}, got {:?}",
            case.name,
            actual.yields
        );
    }
    if let Some(prints) = &call.prints {
        ensure!(
            &actual.output == prints,
            "Output mismatch for {}: expected {prints:?}, got {:?}",
            case.name,
            actual.output
        );
    }
    Ok(())
}

fn run_transform_case(case: &Case, function: &AcquiredFunction, config: &PipelineConfig) -> Result<()> {
    let pipeline = config.build()?;
    let transformed = pipeline
        .apply(function)
        .with_context(|| format!("Pipeline failed for {}", case.name))?;
    let source = transformed.source();

    if let Some(source_file) = case.spec.expected.source_file.as_deref() {
        let expected = case.read_text(source_file)?;
        assert_eq!(
            normalize_output(&source),
            normalize_output(&expected),
            "Source mismatch for {}",
            case.name
        );
    }

    if case.spec.idempotent {
        let again = acquire(&source, &case.spec.function, function.scope.clone())?;
        let twice = pipeline
            .apply(&again)
            .with_context(|| format!("Second application failed for {}", case.name))?;
        assert_eq!(source, twice.source(), "Pipeline not idempotent for {}", case.name);
    }

    if case.spec.calls.is_empty() {
        return Ok(());
    }
    let original = interpreter::compile(&function.def, &baseline_scope(&function.scope, config)?)
        .with_context(|| format!("Compiling original of {}", case.name))?;
    let compiled = transformed
        .compile()
        .with_context(|| format!("Compiling transformed {}", case.name))?;
    for call in &case.spec.calls {
        let args = call.args.iter().map(yaml_value).collect::<Result<Vec<_>>>()?;
        let expected = original
            .call(&args)
            .with_context(|| format!("Calling original {}", case.name))?;
        let actual = compiled
            .call(&args)
            .with_context(|| format!("Calling transformed {}", case.name))?;
        check_call(case, call, &expected, &actual)?;
    }
    Ok(())
}

fn run_error_case(case: &Case, function: &AcquiredFunction, config: &PipelineConfig) -> Result<()> {
    let expected_file = case
        .spec
        .expected
        .error_contains_file
        .as_deref()
        .with_context(|| format!("Missing error expectation file in {}", case.name))?;
    let expected_error = case.read_text(expected_file)?;
    let expected_error = expected_error.trim();

    let result = config
        .build()
        .map_err(pragma::PragmaError::from)
        .and_then(|pipeline| pipeline.apply(function));
    let actual = match result {
        Ok(transformed) => bail!(
            "Expected an error in {}, but the pipeline produced:\n{}",
            case.name,
            transformed.source()
        ),
        Err(error) => error.to_string(),
    };
    ensure!(
        actual.contains(expected_error),
        "Expected error containing '{expected_error}' in {}, got '{actual}'",
        case.name
    );
    Ok(())
}

#[test]
fn transforms_programs() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        if case.spec.bench.enabled {
            ensure!(
                !case.spec.bench.tags.is_empty(),
                "Case {} has bench enabled but no tags",
                case.name
            );
        }
        let program = case.program()?;
        let config = PipelineConfig::from_yaml(&case.pipeline()?)
            .with_context(|| format!("Parsing pipeline for {}", case.name))?;
        let function = acquire(&program, &case.spec.function, case_scope(&case)?)
            .with_context(|| format!("Acquiring {}", case.name))?;

        match case.spec.class {
            CaseClass::Transform => run_transform_case(&case, &function, &config)?,
            CaseClass::TransformError => run_error_case(&case, &function, &config)?,
        }
    }

    Ok(())
}
