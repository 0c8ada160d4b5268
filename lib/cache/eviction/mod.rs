//! Eviction policies for bounded caches.
pub mod lru;
