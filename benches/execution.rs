//! Execution benchmarks for the interpreter.
//!
//! These benchmarks measure instruction dispatch, call overhead and bulk
//! memory operations on small hand-assembled modules.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tarn::{parse, Instance, Module, Value};

#[path = "../tests/common/mod.rs"]
mod common;

use common::*;

/// run(n): count a local up to n and return it
fn noop_loop() -> Vec<u8> {
    #[rustfmt::skip]
    let body = [
        0x03, 0x40,
          0x20, 0x01, 0x41, 0x01, 0x6a, 0x22, 0x01,
          0x20, 0x00, 0x48, 0x0d, 0x00,
        0x0b,
        0x20, 0x01,
    ];
    ModuleBuilder::new()
        .func(&[I32], &[I32], &[(1, I32)], &body)
        .export("run", KIND_FUNC, 0)
        .build()
}

fn fib_iterative() -> Vec<u8> {
    #[rustfmt::skip]
    let body = [
        0x41, 0x01, 0x21, 0x02,
        0x02, 0x40,
          0x03, 0x40,
            0x20, 0x00, 0x45, 0x0d, 0x01,
            0x20, 0x01, 0x20, 0x02, 0x6a, 0x20, 0x02, 0x21, 0x01, 0x21, 0x02,
            0x20, 0x00, 0x41, 0x01, 0x6b, 0x21, 0x00,
            0x0c, 0x00,
          0x0b,
        0x0b,
        0x20, 0x01,
    ];
    ModuleBuilder::new()
        .func(&[I32], &[I32], &[(2, I32)], &body)
        .export("fib", KIND_FUNC, 0)
        .build()
}

fn fib_recursive() -> Vec<u8> {
    #[rustfmt::skip]
    let body = [
        0x20, 0x00, 0x41, 0x02, 0x48,
        0x04, 0x7f,
          0x20, 0x00,
        0x05,
          0x20, 0x00, 0x41, 0x01, 0x6b, 0x10, 0x00,
          0x20, 0x00, 0x41, 0x02, 0x6b, 0x10, 0x00,
          0x6a,
        0x0b,
    ];
    ModuleBuilder::new()
        .func(&[I32], &[I32], &[], &body)
        .export("fib", KIND_FUNC, 0)
        .build()
}

/// fill(dst, len, value) and copy(dst, src, len), both returning len
fn memcpy() -> Vec<u8> {
    ModuleBuilder::new()
        .memory(1, None)
        .func(
            &[I32, I32, I32],
            &[I32],
            &[],
            &[0x20, 0x00, 0x20, 0x02, 0x20, 0x01, 0xfc, 0x0b, 0x00, 0x20, 0x01],
        )
        .func(
            &[I32, I32, I32],
            &[I32],
            &[],
            &[0x20, 0x00, 0x20, 0x01, 0x20, 0x02, 0xfc, 0x0a, 0x00, 0x00, 0x20, 0x02],
        )
        .export("fill", KIND_FUNC, 0)
        .export("copy", KIND_FUNC, 1)
        .build()
}

fn load_module(bytes: &[u8]) -> Module {
    parse(bytes).expect("benchmark module should parse")
}

fn call(instance: &mut Instance, func: &str, args: &[Value]) -> Vec<Value> {
    instance.call_export(func, args).expect("benchmark call failed")
}

/// Verify module correctness before benchmarking
fn verify_modules() {
    {
        let module = load_module(&noop_loop());
        let mut instance = Instance::new(&module).unwrap();
        assert_eq!(call(&mut instance, "run", &[Value::I32(1000)]), vec![Value::I32(1000)]);
    }

    let cases = [(0, 0), (1, 1), (10, 55), (20, 6765)];
    for bytes in [fib_iterative(), fib_recursive()] {
        let module = load_module(&bytes);
        let mut instance = Instance::new(&module).unwrap();
        for (n, expected) in cases {
            assert_eq!(
                call(&mut instance, "fib", &[Value::I32(n)]),
                vec![Value::I32(expected)],
                "fib({}) should be {}",
                n,
                expected
            );
        }
    }

    {
        let module = load_module(&memcpy());
        let mut instance = Instance::new(&module).unwrap();
        call(&mut instance, "fill", &[Value::I32(0), Value::I32(1000), Value::I32(0x42)]);
        call(&mut instance, "copy", &[Value::I32(4096), Value::I32(0), Value::I32(1000)]);
        let data = instance.memory().unwrap().data();
        assert!(data[4096..5096].iter().all(|b| *b == 0x42));
    }
}

fn bench_noop_loop(c: &mut Criterion) {
    let module = load_module(&noop_loop());

    let mut group = c.benchmark_group("dispatch");
    for iterations in [1_000, 10_000, 100_000, 1_000_000] {
        group.bench_with_input(BenchmarkId::new("noop_loop", iterations), &iterations, |b, &n| {
            let mut instance = Instance::new(&module).unwrap();
            b.iter(|| black_box(call(&mut instance, "run", &[Value::I32(n)])));
        });
    }
    group.finish();
}

fn bench_fib_iterative(c: &mut Criterion) {
    let module = load_module(&fib_iterative());

    let mut group = c.benchmark_group("compute");
    for n in [10, 20, 30, 40, 46] {
        group.bench_with_input(BenchmarkId::new("fib_iterative", n), &n, |b, &n| {
            let mut instance = Instance::new(&module).unwrap();
            b.iter(|| black_box(call(&mut instance, "fib", &[Value::I32(n)])));
        });
    }
    group.finish();
}

fn bench_fib_recursive(c: &mut Criterion) {
    let module = load_module(&fib_recursive());

    let mut group = c.benchmark_group("call_overhead");
    for n in [10, 15, 20, 25] {
        group.bench_with_input(BenchmarkId::new("fib_recursive", n), &n, |b, &n| {
            let mut instance = Instance::new(&module).unwrap();
            b.iter(|| black_box(call(&mut instance, "fib", &[Value::I32(n)])));
        });
    }
    group.finish();
}

fn bench_memcpy(c: &mut Criterion) {
    let module = load_module(&memcpy());

    let mut group = c.benchmark_group("memory");
    for size in [100, 1000, 4000, 32000] {
        group.bench_with_input(BenchmarkId::new("memcpy", size), &size, |b, &size| {
            let mut instance = Instance::new(&module).unwrap();
            call(&mut instance, "fill", &[Value::I32(0), Value::I32(size), Value::I32(0x42)]);
            b.iter(|| {
                black_box(call(
                    &mut instance,
                    "copy",
                    &[Value::I32(32768), Value::I32(0), Value::I32(size)],
                ))
            });
        });
    }
    group.finish();
}

// Run verification before benchmarks
fn verify_and_bench(c: &mut Criterion) {
    verify_modules();
    bench_noop_loop(c);
    bench_fib_iterative(c);
    bench_fib_recursive(c);
    bench_memcpy(c);
}

criterion_group!(benches, verify_and_bench);
criterion_main!(benches);
