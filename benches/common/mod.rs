#![allow(dead_code)]
use std::path::Path;

use pragma::acquire::{AcquiredFunction, acquire};
use pragma::pragma::config::{ConfigValue, PipelineConfig};
use pragma::runtime::Bindings;
use test_support::load_cases;

pub struct Workload {
    pub label: String,
    pub source: String,
    pub function: AcquiredFunction,
    pub config: PipelineConfig,
}

/// Transform cases tagged for benchmarking.
pub fn workloads() -> Vec<Workload> {
    let cases = load_cases(Path::new("tests/programs")).unwrap_or_else(|err| panic!("load cases: {err}"));
    cases
        .into_iter()
        .filter(|case| case.spec.bench.enabled)
        .map(|case| {
            let source = case.program().unwrap_or_else(|err| panic!("{err}"));
            let pipeline = case.pipeline().unwrap_or_else(|err| panic!("{err}"));
            let config = PipelineConfig::from_yaml(&pipeline)
                .unwrap_or_else(|err| panic!("pipeline for {}: {err}", case.name));
            let mut scope = Bindings::new();
            for (name, value) in &case.spec.scope {
                let name = name.as_str().expect("scope name");
                let value: ConfigValue = serde_yaml::from_value(value.clone())
                    .unwrap_or_else(|err| panic!("scope '{name}' in {}: {err}", case.name));
                scope.insert(name.to_string(), value.to_value().expect("scope value"));
            }
            let function = acquire(&source, &case.spec.function, scope)
                .unwrap_or_else(|err| panic!("acquire {}: {err}", case.name));
            Workload {
                label: case.name,
                source,
                function,
                config,
            }
        })
        .collect()
}
