//! Provides thread-safe caches: a [`Cache`] that loads values with the closure
//! given to each call, and a [`LoadingCache`] bound to a [`CacheLoader`] that
//! can also refresh values in the background.

mod base_cache;
mod builder;
mod cache;
mod loader;
mod loading_cache;
mod refresher;
mod segment;
mod value_initializer;

pub use {
    builder::CacheBuilder, cache::Cache, loader::CacheLoader, loading_cache::LoadingCache,
};
