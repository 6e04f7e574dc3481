use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use loading_cache::{
    notification::RemovalCause,
    sync::{Cache, CacheBuilder, LoadingCache},
    EntryState, ThreadPool,
};
use parking_lot::Mutex;
use paste::paste;

const NUM_THREADS: u8 = 16;
const FILE: &str = "./Cargo.toml";

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn get_file_size(thread_id: u8, path: impl AsRef<Path>, call_counter: &AtomicUsize) -> u64 {
    println!("get_file_size() called by thread {}.", thread_id);
    call_counter.fetch_add(1, Ordering::AcqRel);
    std::fs::metadata(path).map(|m| m.len()).unwrap_or_default()
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

macro_rules! generate_tests {
    ($name:ident, $builder:expr) => {
        paste! {
            #[test]
            fn [<test_ $name _get_with>]() {
                let cache: Cache<String, u64> = $builder.build();
                let call_counter = Arc::new(AtomicUsize::default());

                let threads: Vec<_> = (0..NUM_THREADS)
                    .map(|thread_id| {
                        let my_cache = cache.clone();
                        let my_call_counter = Arc::clone(&call_counter);
                        thread::spawn(move || {
                            let key = "key1".to_string();
                            let value = my_cache.get_with(key.clone(), || {
                                get_file_size(thread_id, FILE, &my_call_counter)
                            });
                            assert!(value > 0);
                            assert_eq!(my_cache.get_if_present(&key), Some(value));
                        })
                    })
                    .collect();

                threads
                    .into_iter()
                    .for_each(|t| t.join().expect("Thread failed"));

                assert_eq!(call_counter.load(Ordering::Acquire), 1);
                let stats = cache.stats();
                assert_eq!(stats.miss_count(), 1);
                assert_eq!(stats.load_success_count(), 1);
            }

            #[test]
            fn [<test_ $name _loader_error_is_shared>]() {
                let call_counter = Arc::new(AtomicUsize::default());
                let counter = Arc::clone(&call_counter);
                let cache: LoadingCache<String, u64, _> =
                    $builder.build_with_loader(move |path: &String| -> anyhow::Result<u64> {
                        counter.fetch_add(1, Ordering::AcqRel);
                        thread::sleep(Duration::from_millis(200));
                        Ok(std::fs::metadata(path)?.len())
                    });

                let threads: Vec<_> = (0..NUM_THREADS)
                    .map(|_| {
                        let my_cache = cache.clone();
                        thread::spawn(move || my_cache.get(&"./no-such-file".to_string()))
                    })
                    .collect();

                let results = threads
                    .into_iter()
                    .map(|t| t.join().expect("Thread failed"))
                    .collect::<Vec<_>>();
                assert!(results.iter().all(|r| r.is_err()));

                // Errors are not cached.
                let calls = call_counter.load(Ordering::Acquire);
                assert!(calls >= 1 && calls < NUM_THREADS as usize);
                assert!(cache.get(&FILE.to_string()).is_ok());
                assert!(cache.get(&"./no-such-file".to_string()).is_err());
                assert_eq!(call_counter.load(Ordering::Acquire), calls + 2);
                assert_eq!(cache.entry_count(), 1);
            }

            #[test]
            fn [<test_ $name _capacity>]() {
                const MAX_CAPACITY: u64 = 50;

                let evicted = Arc::new(AtomicUsize::default());
                let counter = Arc::clone(&evicted);
                let cache: Cache<String, u64> = $builder
                    .max_capacity(MAX_CAPACITY)
                    .eviction_listener(move |_k, _v, cause| {
                        assert_eq!(cause, RemovalCause::Size);
                        counter.fetch_add(1, Ordering::AcqRel);
                    })
                    .build();

                let threads: Vec<_> = (0..NUM_THREADS)
                    .map(|thread_id| {
                        let my_cache = cache.clone();
                        thread::spawn(move || {
                            for i in 0..100u64 {
                                my_cache.insert(format!("{thread_id}-{i}"), i);
                                assert!(my_cache.entry_count() <= MAX_CAPACITY);
                            }
                        })
                    })
                    .collect();

                threads
                    .into_iter()
                    .for_each(|t| t.join().expect("Thread failed"));

                let inserted = NUM_THREADS as u64 * 100;
                assert_eq!(cache.entry_count(), MAX_CAPACITY);
                assert_eq!(
                    evicted.load(Ordering::Acquire) as u64,
                    inserted - MAX_CAPACITY
                );
                assert_eq!(cache.stats().eviction_by_size_count(), inserted - MAX_CAPACITY);
            }
        }
    };
}

generate_tests!(cache, CacheBuilder::new(100));
generate_tests!(seg_cache, CacheBuilder::new(100).segments(4));

#[test]
fn refresh_serves_the_old_value() {
    init_logger();

    let version = Arc::new(AtomicUsize::default());
    let loader_version = Arc::clone(&version);
    let cache = CacheBuilder::new(10)
        .name("refreshing")
        .expire_after_write(Duration::from_secs(60))
        .refresh_after_write(Duration::from_millis(100))
        .build_with_loader(move |key: &&'static str| {
            let v = loader_version.fetch_add(1, Ordering::AcqRel);
            Ok::<_, String>(format!("{key}-{v}"))
        });

    assert_eq!(cache.get(&"a"), Ok("a-0".to_string()));
    thread::sleep(Duration::from_millis(200));

    // Due for refresh. Still returns the current value.
    assert_eq!(cache.get(&"a"), Ok("a-0".to_string()));
    assert!(wait_until(Duration::from_secs(5), || {
        cache.get_if_present(&"a") == Some("a-1".to_string())
    }));
    assert!(wait_until(Duration::from_secs(5), || {
        cache.entry_state(&"a") == EntryState::Present
    }));
    assert_eq!(version.load(Ordering::Acquire), 2);

    let stats = cache.stats();
    assert_eq!(stats.miss_count(), 1);
    assert_eq!(stats.load_success_count(), 2);
}

#[test]
fn failed_refresh_is_logged_and_counted() {
    init_logger();

    let calls = Arc::new(AtomicUsize::default());
    let loader_calls = Arc::clone(&calls);
    let cache = CacheBuilder::new(10)
        .name("failing")
        .refresh_after_write(Duration::from_millis(50))
        .build_with_loader(move |key: &u32| {
            if loader_calls.fetch_add(1, Ordering::AcqRel) == 0 {
                Ok(*key)
            } else {
                Err(format!("cannot reload {key}"))
            }
        });

    assert_eq!(cache.get(&7), Ok(7));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(cache.get(&7), Ok(7));

    assert!(wait_until(Duration::from_secs(5), || {
        cache.stats().load_failure_count() == 1
    }));
    assert_eq!(cache.get_if_present(&7), Some(7));
}

#[test]
fn caches_share_a_refresh_pool() {
    init_logger();

    let pool = Arc::new(ThreadPool::with_config("shared-refresh", 2, 64));
    let builder = || {
        CacheBuilder::new(10)
            .refresh_after_write(Duration::from_millis(50))
            .refresh_pool(Arc::clone(&pool))
    };

    let threads_seen = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&threads_seen);
    let cache1 = builder().build_with_loader(move |key: &u32| {
        let name = thread::current().name().map(ToString::to_string);
        seen.lock().push(name);
        Ok::<_, ()>(*key)
    });
    let cache2 = builder()
        .build_with_loader_and_hasher(|key: &u32| Ok::<_, ()>(*key * 2), ahash::RandomState::default());

    assert!(Arc::ptr_eq(&cache1.refresh_pool(), &cache2.refresh_pool()));

    assert_eq!(cache1.get(&1), Ok(1));
    assert_eq!(cache2.get(&1), Ok(2));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(cache1.get(&1), Ok(1));
    assert_eq!(cache2.get(&1), Ok(2));

    assert!(wait_until(Duration::from_secs(5), || {
        cache1.stats().load_success_count() == 2 && cache2.stats().load_success_count() == 2
    }));

    let seen = threads_seen.lock();
    assert_eq!(seen.len(), 2);
    // The first load ran on the caller, the refresh on the pool.
    assert!(seen[1]
        .as_deref()
        .map_or(false, |n| n.starts_with("shared-refresh-")));
}

#[test]
fn expired_entries_are_reloaded() {
    let calls = Arc::new(AtomicUsize::default());
    let loader_calls = Arc::clone(&calls);
    let cache = CacheBuilder::new(10)
        .expire_after_write(Duration::from_millis(50))
        .eviction_listener(|_k, _v, cause| assert_eq!(cause, RemovalCause::Expired))
        .build_with_loader(move |key: &u32| {
            Ok::<_, ()>(*key as usize + loader_calls.fetch_add(1, Ordering::AcqRel))
        });

    assert_eq!(cache.get(&10), Ok(10));
    assert_eq!(cache.get(&10), Ok(10));
    thread::sleep(Duration::from_millis(100));
    assert!(!cache.contains_key(&10));
    assert_eq!(cache.get(&10), Ok(11));

    let stats = cache.stats();
    assert_eq!(stats.hit_count(), 1);
    assert_eq!(stats.miss_count(), 2);
    assert_eq!(stats.eviction_by_expiration_count(), 1);
}

#[test]
fn small_segmented_cache_keeps_what_it_loads() {
    let calls = Arc::new(AtomicUsize::default());
    let loader_calls = Arc::clone(&calls);
    let cache = CacheBuilder::new(3)
        .segments(8)
        .build_with_loader(move |key: &u32| {
            loader_calls.fetch_add(1, Ordering::AcqRel);
            Ok::<_, ()>(key.to_string())
        });
    assert_eq!(cache.policy().num_segments(), 2);

    for key in 0..32u32 {
        assert_eq!(cache.get(&key), Ok(key.to_string()));
        // Read back right after the load, without another load.
        assert_eq!(cache.get_if_present(&key), Some(key.to_string()));
        assert_eq!(cache.get(&key), Ok(key.to_string()));
        assert_eq!(calls.load(Ordering::Acquire), key as usize + 1);
        assert!(cache.entry_count() <= 3);
    }
}
