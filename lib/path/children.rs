//! Child lists with a provisional/confirmed split, and the bounded cache that owns them.
//!
//! A child list is ordered: positions `[0, provisional)` were confirmed by a directory read,
//! positions `[provisional, len)` were created by resolving strings and may not exist. The cut is
//! a single integer. Moving an entry across it is a swap with the entry at the cut, so promotion
//! and insertion stay O(1) even for directories with hundreds of thousands of entries.

use std::sync::{Arc, Weak};

use rustc_hash::FxHashMap;

use crate::cache::eviction::lru::{Evicted, Weighted, WeightedLru};

use super::node::{NodeId, PathNode};

/// The children of one node.
#[derive(Debug, Default)]
pub(crate) struct Children {
    nodes: Vec<Arc<PathNode>>,
    /// Match name to position of the first node with that name.
    index: FxHashMap<Arc<str>, usize>,
    provisional: usize,
}

impl Children {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Index of the first provisional child.
    pub fn provisional(&self) -> usize {
        self.provisional
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PathNode>> {
        self.nodes.iter()
    }

    /// Children confirmed by a directory read, in read order.
    pub fn confirmed(&self) -> &[Arc<PathNode>] {
        &self.nodes[..self.provisional]
    }

    /// Children whose existence is unconfirmed.
    pub fn unconfirmed(&self) -> &[Arc<PathNode>] {
        &self.nodes[self.provisional..]
    }

    /// Looks up a child by match name, returning its position.
    pub fn position(&self, match_name: &str) -> Option<usize> {
        self.index.get(match_name).copied()
    }

    pub fn get(&self, pos: usize) -> Option<&Arc<PathNode>> {
        self.nodes.get(pos)
    }

    /// Appends a child beyond the cut.
    pub fn push_provisional(&mut self, node: Arc<PathNode>) {
        let pos = self.nodes.len();
        self.index.entry(Arc::clone(node.match_name())).or_insert(pos);
        self.nodes.push(node);
    }

    /// Adds a child straight into the confirmed region.
    ///
    /// If a child with the same match name is already indexed, the new node is kept but not
    /// indexed; name lookups keep returning the first one.
    pub fn push_confirmed(&mut self, node: Arc<PathNode>) {
        let pos = self.nodes.len();
        self.index.entry(Arc::clone(node.match_name())).or_insert(pos);
        self.nodes.push(node);
        self.swap(pos, self.provisional);
        self.provisional += 1;
    }

    /// Moves the provisional child at `pos` into the confirmed region.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is already confirmed or out of bounds.
    pub fn promote(&mut self, pos: usize) -> &Arc<PathNode> {
        assert!(
            pos >= self.provisional && pos < self.nodes.len(),
            "promoting position {pos} outside the provisional region {}..{}",
            self.provisional,
            self.nodes.len()
        );
        let cut = self.provisional;
        self.swap(pos, cut);
        self.provisional += 1;
        &self.nodes[cut]
    }

    /// Marks every child provisional.
    pub fn demote_all(&mut self) {
        self.provisional = 0;
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.nodes.swap(a, b);
        for (now, was) in [(a, b), (b, a)] {
            if let Some(slot) = self.index.get_mut(self.nodes[now].match_name().as_ref()) {
                if *slot == was {
                    *slot = now;
                }
            }
        }
    }
}

/// A cached child list together with the node it belongs to.
#[derive(Debug)]
pub(crate) struct ChildSlot {
    pub owner: Weak<PathNode>,
    pub children: Children,
}

impl ChildSlot {
    pub fn new(owner: &Arc<PathNode>) -> Self {
        Self {
            owner: Arc::downgrade(owner),
            children: Children::default(),
        }
    }
}

impl Weighted for ChildSlot {
    fn weight(&self) -> usize {
        self.children.len() + 1
    }
}

/// Child lists keyed by owner, bounded by the total number of children held.
pub(crate) type ChildrenCache = WeightedLru<NodeId, ChildSlot>;

/// Child lists pushed out of the [`ChildrenCache`].
pub(crate) type EvictedChildren = Evicted<NodeId, ChildSlot>;
