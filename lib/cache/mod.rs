/// Cache eviction policies.
pub mod eviction;
/// Coalescing of concurrent async computations.
pub mod inflight;
