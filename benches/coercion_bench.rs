//! Criterion benchmarks for argument coercion and result serialization.
//!
//! Both run once per invocation, on the worker and the reply path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nexus_script_bridge::coerce::{coerce_arguments, serialize_result};
use nexus_script_bridge::{HostValue, WireValue};
use std::collections::BTreeMap;

fn form_payload(fields: usize) -> WireValue {
    let object: BTreeMap<String, WireValue> = (0..fields)
        .map(|i| (format!("field{i}"), WireValue::Number(i as f64 + 0.5)))
        .collect();
    WireValue::Object(object)
}

fn bench_coerce_arguments(c: &mut Criterion) {
    let mut group = c.benchmark_group("coerce/arguments");

    for fields in [4, 32, 256] {
        let args = vec![form_payload(fields), WireValue::Bool(true)];
        group.bench_with_input(BenchmarkId::new("object_fields", fields), &args, |b, args| {
            b.iter(|| coerce_arguments(black_box(args.clone()), true));
        });
    }

    let json = serde_json::to_string(&form_payload(32)).unwrap_or_default();
    group.bench_function("json_string_decode", |b| {
        b.iter(|| coerce_arguments(black_box(vec![WireValue::String(json.clone())]), true));
    });

    group.finish();
}

fn bench_serialize_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("coerce/serialize");

    for items in [8, 128, 1024] {
        let value = HostValue::from((0..items).map(|i| format!("message{i}")).collect::<Vec<_>>());
        group.bench_with_input(BenchmarkId::new("string_array", items), &value, |b, value| {
            b.iter(|| serialize_result(black_box(value)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_coerce_arguments, bench_serialize_result);
criterion_main!(benches);
