//! Topic Tree Node: one substring of a topic path plus its children.

use crate::error::{EngineError, Result};
use crate::topic_tree::analysis::{MULTICARD, WILDCARD};

/// Stable index of a node inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Normal,
    Wildcard,
    Multicard,
}

impl NodeKind {
    pub(crate) fn for_substring(substring: &str) -> Self {
        match substring {
            WILDCARD => Self::Wildcard,
            MULTICARD => Self::Multicard,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlags(u32);

impl NodeFlags {
    pub const NONE: Self = Self(0);
    pub const TREE_ROOT: Self = Self(0x0000_0004);
    pub const CLUSTER_REQUESTED_TOPIC: Self = Self(0x0000_0040);
    pub const INACTIVE: Self = Self(0x0000_0100);
    pub const BRANCH_WILD_OR_MULTI: Self = Self(0x1000_0000);
    pub const BRANCH_MULTIMULTI: Self = Self(0x2000_0000);
    pub const BRANCH_SYSTOPIC: Self = Self(0x4000_0000);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

const INITIAL_CHILD_CAPACITY: usize = 2;
// Resize once the average chain is this long
const CHILD_HIGH_WATER: usize = 5;

#[derive(Debug, Clone, Copy)]
struct ChildSlot {
    hash: u32,
    id: NodeId,
}

/// Normal children keyed by substring hash. Substring equality is checked by the
/// caller, which owns the nodes.
#[derive(Debug, Default)]
pub struct ChildTable {
    buckets: Vec<Vec<ChildSlot>>,
    len: usize,
}

impl ChildTable {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn find(&self, hash: u32, mut same_key: impl FnMut(NodeId) -> bool) -> Option<NodeId> {
        if self.buckets.is_empty() {
            return None;
        }
        self.buckets[hash as usize % self.buckets.len()]
            .iter()
            .find(|slot| slot.hash == hash && same_key(slot.id))
            .map(|slot| slot.id)
    }

    /// Makes room for one more child so the following `insert` cannot fail.
    pub(crate) fn reserve_one(&mut self, hash: u32) -> Result<()> {
        let capacity = self.buckets.len();
        if capacity == 0 {
            self.rehash(INITIAL_CHILD_CAPACITY)?;
        } else if self.len + 1 > capacity * (CHILD_HIGH_WATER - 1) {
            self.rehash(capacity * 2 + 1)?;
        }
        let index = hash as usize % self.buckets.len();
        self.buckets[index]
            .try_reserve(1)
            .map_err(|_| EngineError::AllocateError)
    }

    pub(crate) fn insert(&mut self, hash: u32, id: NodeId) {
        let index = hash as usize % self.buckets.len();
        self.buckets[index].push(ChildSlot { hash, id });
        self.len += 1;
    }

    pub(crate) fn remove(&mut self, hash: u32, id: NodeId) -> bool {
        if self.buckets.is_empty() {
            return false;
        }
        let index = hash as usize % self.buckets.len();
        let bucket = &mut self.buckets[index];
        match bucket.iter().position(|slot| slot.id == id) {
            Some(pos) => {
                bucket.swap_remove(pos);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.buckets.iter().flatten().map(|slot| slot.id)
    }

    // The new table is fully built before it replaces the old one, so a failed
    // allocation leaves the current table untouched.
    fn rehash(&mut self, new_capacity: usize) -> Result<()> {
        let mut buckets: Vec<Vec<ChildSlot>> = Vec::new();
        buckets
            .try_reserve_exact(new_capacity)
            .map_err(|_| EngineError::AllocateError)?;
        buckets.resize_with(new_capacity, Vec::new);

        for slot in self.buckets.iter().flatten() {
            buckets[slot.hash as usize % new_capacity].push(*slot);
        }

        tracing::debug!("Child table resized {} -> {} ({} children)", self.buckets.len(), new_capacity, self.len);
        self.buckets = buckets;
        Ok(())
    }
}

pub struct TrieNode<D> {
    pub(crate) substring: Box<str>,
    pub(crate) hash: u32,
    pub(crate) kind: NodeKind,
    pub(crate) flags: NodeFlags,
    // Navigation only; the parent owns this node through its child slots.
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: ChildTable,
    pub(crate) wildcard_child: Option<NodeId>,
    pub(crate) multicard_child: Option<NodeId>,
    pub(crate) data: D,
}

impl<D: Default> TrieNode<D> {
    pub(crate) fn new(substring: &str, hash: u32, kind: NodeKind, flags: NodeFlags, parent: Option<NodeId>) -> Self {
        Self {
            substring: substring.into(),
            hash,
            kind,
            flags,
            parent,
            children: ChildTable::default(),
            wildcard_child: None,
            multicard_child: None,
            data: D::default(),
        }
    }
}

impl<D> TrieNode<D> {
    pub fn substring(&self) -> &str {
        &self.substring
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty() || self.wildcard_child.is_some() || self.multicard_child.is_some()
    }

    pub fn is_system_branch(&self) -> bool {
        self.flags.contains(NodeFlags::BRANCH_SYSTOPIC)
    }

    pub fn is_multi_multi(&self) -> bool {
        self.flags.contains(NodeFlags::BRANCH_MULTIMULTI)
    }

    pub(crate) fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().chain(self.wildcard_child).chain(self.multicard_child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_bit_ops() {
        let mut flags = NodeFlags::NONE;
        flags.insert(NodeFlags::BRANCH_WILD_OR_MULTI);
        flags.insert(NodeFlags::INACTIVE);
        assert!(flags.contains(NodeFlags::INACTIVE));
        assert!(!flags.contains(NodeFlags::BRANCH_SYSTOPIC));

        flags.remove(NodeFlags::INACTIVE);
        assert_eq!(flags.bits(), 0x1000_0000);
    }

    #[test]
    fn test_child_table_grows_past_high_water() {
        let mut table = ChildTable::default();
        for i in 0..100u32 {
            table.reserve_one(i * 7).unwrap();
            table.insert(i * 7, NodeId(i as usize));
        }

        assert_eq!(table.len(), 100);
        assert!(table.capacity() * (CHILD_HIGH_WATER - 1) >= 100);
        for i in 0..100u32 {
            assert_eq!(table.find(i * 7, |id| id == NodeId(i as usize)), Some(NodeId(i as usize)));
        }
        assert_eq!(table.iter().count(), 100);
    }

    #[test]
    fn test_child_table_remove() {
        let mut table = ChildTable::default();
        table.reserve_one(42).unwrap();
        table.insert(42, NodeId(1));
        table.reserve_one(42).unwrap();
        table.insert(42, NodeId(2));

        assert!(table.remove(42, NodeId(1)));
        assert!(!table.remove(42, NodeId(1)));
        assert_eq!(table.find(42, |_| true), Some(NodeId(2)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_kind_for_substring() {
        assert_eq!(NodeKind::for_substring("+"), NodeKind::Wildcard);
        assert_eq!(NodeKind::for_substring("#"), NodeKind::Multicard);
        assert_eq!(NodeKind::for_substring("+#"), NodeKind::Normal);
    }
}
