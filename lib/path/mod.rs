//! The path graph.
//!
//! Nodes are shared through `Arc` with a strong link to their parent. Downward links live only in
//! the children cache, so evicting a child list is what lets a subtree be freed.

pub(crate) mod children;
pub mod entry;
pub(crate) mod node;
pub mod platform;
pub(crate) mod tree;

pub use entry::{PathEntry, Schedule};
pub use node::NodeId;
pub use platform::Platform;
pub use tree::CacheStats;
