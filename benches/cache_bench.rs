//! Allocation-path benchmarks: cached temporaries against uncached
//! registry allocations, over the host driver.
//!
//! Run with: `cargo bench --bench cache_bench`

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use hipmux::{GpuDevice, GpuDriver, GpuManager, HostDriver, MemKind};

fn manager() -> GpuManager {
    let driver = Arc::new(HostDriver::new()) as Arc<dyn GpuDriver>;
    GpuManager::new(GpuDevice::new(0, "host-emulation"), driver)
        .expect("host manager construction cannot fail")
}

fn bench_temp_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("temp_allocation");

    for &bytes in &[1usize << 10, 1 << 16, 1 << 20] {
        group.bench_function(format!("cached/{}", bytes), |b| {
            let mgr = manager();
            let policy = mgr.execution_policy(0);
            // Warm the free list so the steady state is pure reuse.
            let warm = policy.allocate_temp(bytes).unwrap();
            policy.release_temp(warm).unwrap();
            b.iter(|| {
                let ptr = policy.allocate_temp(black_box(bytes)).unwrap();
                policy.release_temp(black_box(ptr)).unwrap();
            });
        });

        group.bench_function(format!("uncached/{}", bytes), |b| {
            let mgr = manager();
            b.iter(|| {
                let ptr = mgr.allocate(black_box(bytes), MemKind::Device).unwrap();
                mgr.free(black_box(ptr));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_temp_allocation);
criterion_main!(benches);
