#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! A thread-safe, in-memory loading cache.
//!
//! The caches in this crate hold up to a given number of entries and evict the
//! least recently used one when a new entry would go over that number. Entries
//! can also expire a fixed time after they were written (`expire_after_write`)
//! or after they were last read (`expire_after_access`).
//!
//! Missing values are computed on demand. When many threads ask for the same
//! missing key at the same time, only one of them computes the value and the
//! others wait for its result.
//!
//! - [`sync::Cache`] computes missing values with the closure given to each
//!   call.
//! - [`sync::LoadingCache`] computes them with a [`sync::CacheLoader`]. It can
//!   also refresh values older than `refresh_after_write` on a background
//!   [`ThreadPool`], while readers keep getting the old value.
//!
//! Both record [`stats::CacheStats`] and can notify an eviction listener of
//! every removed entry.
//!
//! # Example
//!
//! ```rust
//! use loading_cache::sync::LoadingCache;
//!
//! use std::{thread, time::Duration};
//!
//! fn value(n: usize) -> String {
//!     format!("value {n}")
//! }
//!
//! const NUM_THREADS: usize = 8;
//! const NUM_KEYS_PER_THREAD: usize = 16;
//!
//! let cache: LoadingCache<usize, String, _> = LoadingCache::builder()
//!     .max_capacity(1_000)
//!     .expire_after_write(Duration::from_secs(60))
//!     .refresh_after_write(Duration::from_secs(10))
//!     .build_with_loader(|key: &usize| Ok::<_, std::convert::Infallible>(value(*key)));
//!
//! let threads: Vec<_> = (0..NUM_THREADS)
//!     .map(|i| {
//!         // To share the same cache across the threads, clone it.
//!         // This is a cheap operation.
//!         let my_cache = cache.clone();
//!         let start = i * NUM_KEYS_PER_THREAD;
//!         let end = (i + 1) * NUM_KEYS_PER_THREAD;
//!
//!         thread::spawn(move || {
//!             for key in start..end {
//!                 assert_eq!(my_cache.get(&key), Ok(value(key)));
//!                 // Any thread can see the values loaded by the others.
//!                 assert_eq!(my_cache.get(&(key / 4)), Ok(value(key / 4)));
//!             }
//!         })
//!     })
//!     .collect();
//!
//! threads.into_iter().for_each(|t| t.join().expect("Failed"));
//!
//! // Each key was loaded only once.
//! let stats = cache.stats();
//! assert_eq!(stats.load_success_count(), (NUM_THREADS * NUM_KEYS_PER_THREAD) as u64);
//! ```
//!
//! # Logging
//!
//! With the default `logging` feature, failed refreshes and panicking eviction
//! listeners are reported through the [`log`](https://docs.rs/log) crate.
//!
//! # Minimum Supported Rust Version
//!
//! This crate's minimum supported Rust version (MSRV) is 1.65.

pub(crate) mod common;
pub mod notification;
pub mod stats;
pub mod sync;

mod policy;
mod thread_pool;

pub use common::error::PoolError;
pub use policy::{EntryState, Policy};
pub use thread_pool::ThreadPool;
