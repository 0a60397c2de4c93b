mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pragma::acquire::acquire;
use pragma::runtime::Value;

fn bench_transform(c: &mut Criterion) {
    for workload in common::workloads() {
        let pipeline = workload.config.build().expect("build");
        let name = workload.function.def.name.clone();

        c.bench_function(&format!("acquire_{}", workload.label), |b| {
            b.iter(|| {
                let out = acquire(black_box(&workload.source), &name, workload.function.scope.clone())
                    .expect("acquire");
                black_box(out);
            })
        });

        c.bench_function(&format!("transform_{}", workload.label), |b| {
            b.iter(|| {
                let out = pipeline.apply(black_box(&workload.function)).expect("transform");
                black_box(out.source());
            })
        });

        let transformed = pipeline.apply(&workload.function).expect("transform");
        let compiled = transformed.compile().expect("compile");
        let args = compiled
            .definition()
            .params
            .iter()
            .filter(|param| param.default.is_none())
            .map(|_| Value::Integer(3))
            .collect::<Vec<_>>();
        c.bench_function(&format!("call_transformed_{}", workload.label), |b| {
            b.iter(|| {
                let out = compiled.call(black_box(&args)).expect("call");
                black_box(out);
            })
        });
    }
}

criterion_group!(benches, bench_transform);
criterion_main!(benches);
