//! Benchmark suite for the cache operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loading_cache::sync::{Cache, CacheBuilder, LoadingCache};
use std::{convert::Infallible, thread, time::Duration};

fn loading_cache(size: u64) -> LoadingCache<u64, String, fn(&u64) -> Result<String, Infallible>> {
    fn load(key: &u64) -> Result<String, Infallible> {
        Ok(format!("value-{key}"))
    }
    CacheBuilder::new(size).build_with_loader(load as fn(&u64) -> Result<String, Infallible>)
}

/// Benchmark insertion of new entries into an empty cache.
///
/// Tests cache sizes: 100, 1,000, and 10,000 entries.
fn insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let cache: Cache<u64, String> = Cache::new(size);
                for i in 0..size {
                    cache.insert(black_box(i), black_box(format!("value-{i}")));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark read operations on a pre-populated cache.
fn get_if_present_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_if_present");

    for size in [100, 1000, 10000].iter() {
        let cache: Cache<u64, String> = Cache::new(*size);
        for i in 0..*size {
            cache.insert(i, format!("value-{i}"));
        }

        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    let _ = cache.get_if_present(&black_box(i));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark `LoadingCache::get` when every key is already loaded.
fn loading_get_hit_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("loading_get_hit");

    for size in [100, 1000, 10000].iter() {
        let cache = loading_cache(*size);
        for i in 0..*size {
            let _ = cache.get(&i);
        }

        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    let _ = cache.get(&black_box(i));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark `LoadingCache::get` on an empty cache, so that every call loads.
fn loading_get_miss_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("loading_get_miss");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let cache = loading_cache(size);
                for i in 0..size {
                    let _ = cache.get(&black_box(i));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark many threads asking for the same missing keys at once.
///
/// Each key is loaded by one thread while the others wait for it.
fn contended_load_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_load");
    let num_keys = 100;

    for num_threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements(num_keys * *num_threads as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let cache = loading_cache(num_keys);
                    let handles = (0..num_threads)
                        .map(|_| {
                            let cache = cache.clone();
                            thread::spawn(move || {
                                for i in 0..num_keys {
                                    let _ = cache.get(&black_box(i));
                                }
                            })
                        })
                        .collect::<Vec<_>>();
                    for h in handles {
                        h.join().expect("Failed to join");
                    }
                });
            },
        );
    }
    group.finish();
}

/// Benchmark mixed cache operations representing a realistic workload.
///
/// Distribution: 33% inserts, 33% loading gets, 33% contains_key operations.
fn mixed_operations_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_ops");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let cache = loading_cache(size);
                for i in 0..size {
                    if i % 3 == 0 {
                        cache.insert(black_box(i), black_box(format!("value-{i}")));
                    } else if i % 3 == 1 {
                        let _ = cache.get(&black_box(i));
                    } else {
                        let _ = cache.contains_key(&black_box(i));
                    }
                }
            });
        });
    }
    group.finish();
}

/// Benchmark LRU eviction performance.
///
/// Inserts 2,000 entries into a cache with capacity of 1,000 to trigger evictions.
fn eviction_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");

    let cache_size = 1000;
    let insert_count = 2000;

    group.throughput(Throughput::Elements(insert_count));
    group.bench_function("lru_eviction", |b| {
        b.iter(|| {
            let cache: Cache<u64, String> = Cache::new(cache_size);
            for i in 0..insert_count {
                cache.insert(black_box(i), black_box(format!("value-{i}")));
            }
        });
    });

    group.bench_function("lru_eviction_segmented", |b| {
        b.iter(|| {
            let cache: Cache<u64, String> = CacheBuilder::new(cache_size).segments(8).build();
            for i in 0..insert_count {
                cache.insert(black_box(i), black_box(format!("value-{i}")));
            }
        });
    });

    group.finish();
}

/// Benchmark update operations on pre-populated cache.
fn update_existing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_existing");

    for size in [100, 1000, 10000].iter() {
        let cache: Cache<u64, String> = Cache::new(*size);
        for i in 0..*size {
            cache.insert(i, format!("value-{i}"));
        }

        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    cache.insert(black_box(i), black_box(format!("updated-{i}")));
                }
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = insert_benchmark, get_if_present_benchmark, loading_get_hit_benchmark,
              loading_get_miss_benchmark, contended_load_benchmark, mixed_operations_benchmark,
              eviction_benchmark, update_existing_benchmark
}

criterion_main!(benches);
