//! Basic benchmarks for the `clique_pool` package, including a comparison against the global
//! allocator in both time and number of allocations.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::alloc::{Layout, alloc, dealloc};
use std::hint::black_box;
use std::ptr::NonNull;
use std::time::Instant;

use alloc_tracker::Allocator;
use clique_pool::{DirectHeader, PoolAllocator};
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = u64;
const TEST_VALUE: TestItem = 1024;

/// Number of items allocated and then deallocated in each fill iteration.
const FILL_COUNT: usize = 10_000;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("cp_single");

    let allocs_op = allocs.operation("pool_warm");
    group.bench_function("pool_warm", |b| {
        b.iter_custom(|iters| {
            let allocator = PoolAllocator::<TestItem>::new();

            // Create the first page outside the measured span.
            let warmup = allocator.allocate(1);
            // SAFETY: The block came from this allocator with the same count.
            unsafe { allocator.deallocate(warmup, 1) };

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let block = allocator.allocate(1);
                // SAFETY: The block is freshly allocated and sized for one item.
                unsafe { block.write(black_box(TEST_VALUE)) };
                // SAFETY: The block came from this allocator with the same count.
                unsafe { allocator.deallocate(black_box(block), 1) };
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("system_allocator");
    group.bench_function("system_allocator", |b| {
        b.iter_custom(|iters| {
            let layout = Layout::new::<TestItem>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                // SAFETY: The layout is not zero-sized.
                let block = NonNull::new(unsafe { alloc(layout) })
                    .expect("benchmark does not handle allocation failure")
                    .cast::<TestItem>();
                // SAFETY: The block is freshly allocated and sized for one item.
                unsafe { block.write(black_box(TEST_VALUE)) };
                // SAFETY: The block was allocated with the same layout.
                unsafe { dealloc(black_box(block).as_ptr().cast(), layout) };
            }

            start.elapsed()
        });
    });

    group.finish();

    let mut group = c.benchmark_group("cp_fill");

    let allocs_op = allocs.operation("empty");
    group.bench_function("empty", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(PoolAllocator::<TestItem>::new()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("ten_thousand_packed");
    group.bench_function("ten_thousand_packed", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                fill(&PoolAllocator::<TestItem>::new());
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("ten_thousand_direct");
    group.bench_function("ten_thousand_direct", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let allocator = PoolAllocator::<TestItem>::builder()
                    .header::<DirectHeader>()
                    .build();

                let blocks = (0..FILL_COUNT)
                    .map(|_| allocator.allocate(1))
                    .collect::<Vec<_>>();

                for block in blocks {
                    // SAFETY: The block came from this allocator with the same count.
                    unsafe { allocator.deallocate(black_box(block), 1) };
                }
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("ten_thousand_boxed");
    group.bench_function("ten_thousand_boxed", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let boxes = (0..FILL_COUNT)
                    .map(|_| Box::new(black_box(TEST_VALUE)))
                    .collect::<Vec<_>>();

                drop(black_box(boxes));
            }

            start.elapsed()
        });
    });

    group.finish();

    let mut group = c.benchmark_group("cp_clique");

    let allocs_op = allocs.operation("clone_and_drop");
    group.bench_function("clone_and_drop", |b| {
        b.iter_custom(|iters| {
            let allocator = PoolAllocator::<TestItem>::new();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(allocator.clone()));
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}

fn fill<T>(allocator: &PoolAllocator<T>) {
    let blocks = (0..FILL_COUNT)
        .map(|_| allocator.allocate(1))
        .collect::<Vec<_>>();

    for block in blocks {
        // SAFETY: The block came from this allocator with the same count.
        unsafe { allocator.deallocate(black_box(block), 1) };
    }
}
