//! Arena-backed topic trie shared by the subscription, remote-server and topics trees.
//!
//! Nodes live in a slab addressed by [`NodeId`]. Parent links are plain indices,
//! ownership flows strictly from parent to child slots. Every structural change
//! happens under the owning tree's write lock; pruned branches are moved out into
//! a [`PrunedSubtree`] so the caller can drop them after unlocking.

use crate::error::{EngineError, Result};
use crate::topic_tree::analysis::TopicAnalysis;
use crate::topic_tree::node::{NodeFlags, NodeId, NodeKind, TrieNode};
use crate::topic_tree::snapshot::TopicNodeSnapshot;

/// Per-node payload of a tree.
pub trait NodeData: Default + Send + Sync {
    /// Anything besides children that keeps this node alive.
    fn has_interest(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOp {
    Add,
    Find,
}

/// Nodes unlinked from a tree, released when this value is dropped.
pub struct PrunedSubtree<D> {
    nodes: Vec<TrieNode<D>>,
}

impl<D> PrunedSubtree<D> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn into_data(self) -> impl Iterator<Item = D> {
        self.nodes.into_iter().map(|node| node.data)
    }
}

pub struct Trie<D> {
    slots: Vec<Option<TrieNode<D>>>,
    free: Vec<NodeId>,
    root: NodeId,
    live: usize,
    /// Interest entries (subscribers, servers) attached to nodes below more than one multicard.
    multi_multi_interest: usize,
}

impl<D: NodeData> Default for Trie<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: NodeData> Trie<D> {
    pub fn new() -> Self {
        let root = TrieNode::new("", 0, NodeKind::Root, NodeFlags::TREE_ROOT, None);
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
            live: 1,
            multi_multi_interest: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Live nodes, root included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        let root = self.node(self.root);
        !root.has_children() && !root.data.has_interest()
    }

    pub fn node(&self, id: NodeId) -> &TrieNode<D> {
        match self.slots.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("topic tree node {:?} used after release", id),
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TrieNode<D> {
        match self.slots.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("topic tree node {:?} used after release", id),
        }
    }

    pub fn data(&self, id: NodeId) -> &D {
        &self.node(id).data
    }

    pub fn data_mut(&mut self, id: NodeId) -> &mut D {
        &mut self.node_mut(id).data
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    // --- MULTI-MULTICARD BOOKKEEPING ---

    pub fn multi_multi_interest(&self) -> usize {
        self.multi_multi_interest
    }

    pub fn note_interest_added(&mut self, id: NodeId) {
        if self.node(id).is_multi_multi() {
            self.multi_multi_interest += 1;
        }
    }

    pub fn note_interest_removed(&mut self, id: NodeId) {
        if self.node(id).is_multi_multi() {
            self.multi_multi_interest = self.multi_multi_interest.saturating_sub(1);
        }
    }

    // --- INSERT / FIND ---

    fn find_child(&self, parent: NodeId, substring: &str, hash: u32) -> Option<NodeId> {
        let node = self.node(parent);
        match NodeKind::for_substring(substring) {
            NodeKind::Wildcard => node.wildcard_child,
            NodeKind::Multicard => node.multicard_child,
            _ => node.children.find(hash, |id| &*self.node(id).substring == substring),
        }
    }

    /// Walks `topic` from the root. `Find` answers `NotFound` at the first missing
    /// node, `Add` creates the missing tail of the path. A failed `Add` unlinks
    /// whatever it had created before returning the error.
    pub fn insert_or_find(&mut self, topic: &TopicAnalysis, op: TreeOp) -> Result<NodeId> {
        let mut current = self.root;
        let mut wild_or_multi_seen = false;
        let mut multicards_seen = 0;
        let mut first_created: Option<NodeId> = None;

        for index in 0..topic.depth() {
            let substring = topic.substring(index);
            let hash = topic.substring_hash(index);
            let kind = NodeKind::for_substring(substring);

            match kind {
                NodeKind::Wildcard => wild_or_multi_seen = true,
                NodeKind::Multicard => {
                    wild_or_multi_seen = true;
                    multicards_seen += 1;
                }
                _ => {}
            }

            if let Some(child) = self.find_child(current, substring, hash) {
                current = child;
                continue;
            }

            if op == TreeOp::Find {
                return Err(EngineError::NotFound);
            }

            let mut flags = NodeFlags::NONE;
            if multicards_seen > 1 {
                flags.insert(NodeFlags::BRANCH_MULTIMULTI);
            }
            if wild_or_multi_seen {
                flags.insert(NodeFlags::BRANCH_WILD_OR_MULTI);
            }
            if topic.is_system_topic() {
                flags.insert(NodeFlags::BRANCH_SYSTOPIC);
            }

            match self.link_new_child(current, substring, hash, kind, flags) {
                Ok(child) => {
                    first_created.get_or_insert(child);
                    current = child;
                }
                Err(e) => {
                    if let Some(created) = first_created {
                        let discarded = self.detach_subtree(created);
                        tracing::debug!("Rolled back {} partially created nodes for '{}'", discarded.len(), topic.topic());
                    }
                    return Err(e);
                }
            }
        }

        Ok(current)
    }

    /// Read-only `Find`: usable under a read lock.
    pub fn find(&self, topic: &TopicAnalysis) -> Result<NodeId> {
        let mut current = self.root;
        for index in 0..topic.depth() {
            current = self
                .find_child(current, topic.substring(index), topic.substring_hash(index))
                .ok_or(EngineError::NotFound)?;
        }
        Ok(current)
    }

    fn link_new_child(&mut self, parent: NodeId, substring: &str, hash: u32, kind: NodeKind, flags: NodeFlags) -> Result<NodeId> {
        if kind == NodeKind::Normal {
            self.node_mut(parent).children.reserve_one(hash)?;
        }

        let id = self.allocate(TrieNode::new(substring, hash, kind, flags, Some(parent)))?;

        let parent_node = self.node_mut(parent);
        match kind {
            NodeKind::Wildcard => parent_node.wildcard_child = Some(id),
            NodeKind::Multicard => parent_node.multicard_child = Some(id),
            _ => parent_node.children.insert(hash, id),
        }
        Ok(id)
    }

    fn allocate(&mut self, node: TrieNode<D>) -> Result<NodeId> {
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id.0] = Some(node);
                id
            }
            None => {
                self.slots.try_reserve(1).map_err(|_| EngineError::AllocateError)?;
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };
        self.live += 1;
        Ok(id)
    }

    // --- PRUNING ---

    /// Unlinks `id` from its parent. The node and its descendants stay in the arena.
    pub fn remove_node_from_tree(&mut self, id: NodeId) {
        let (parent, kind, hash) = {
            let node = self.node(id);
            (node.parent, node.kind, node.hash)
        };
        let Some(parent) = parent else {
            panic!("topic tree node {:?} has no parent to be removed from", id);
        };

        let parent_node = self.node_mut(parent);
        let unlinked = match kind {
            NodeKind::Wildcard if parent_node.wildcard_child == Some(id) => {
                parent_node.wildcard_child = None;
                true
            }
            NodeKind::Multicard if parent_node.multicard_child == Some(id) => {
                parent_node.multicard_child = None;
                true
            }
            NodeKind::Normal => parent_node.children.remove(hash, id),
            _ => false,
        };
        if !unlinked {
            tracing::error!("Topic tree node {:?} not linked from its parent {:?}", id, parent);
            panic!("topic tree node {:?} not linked from its parent", id);
        }

        self.node_mut(id).parent = None;
    }

    /// Walks upward from `start` marking nodes inactive while each one has no
    /// interest and no children other than the branch being pruned. Returns the
    /// highest such node.
    pub fn identify_inactive_subtree(&mut self, start: NodeId) -> Option<NodeId> {
        let mut found = None;
        let mut allow_children = 0;
        let mut allow_wildcard = false;
        let mut allow_multicard = false;
        let mut current = start;

        loop {
            let node = self.node(current);
            let Some(parent) = node.parent else { break };

            if node.data.has_interest()
                || node.children.len() != allow_children
                || (!allow_wildcard && node.wildcard_child.is_some())
                || (!allow_multicard && node.multicard_child.is_some())
            {
                break;
            }

            let kind = node.kind;
            self.node_mut(current).flags.insert(NodeFlags::INACTIVE);
            found = Some(current);

            allow_children = if kind == NodeKind::Normal { 1 } else { 0 };
            allow_wildcard = kind == NodeKind::Wildcard;
            allow_multicard = kind == NodeKind::Multicard;
            current = parent;
        }

        found
    }

    /// Unlinks `id` (if still linked) and moves it and every descendant out of the arena.
    pub fn detach_subtree(&mut self, id: NodeId) -> PrunedSubtree<D> {
        if self.node(id).parent.is_some() {
            self.remove_node_from_tree(id);
        }

        let mut pending = vec![id];
        let mut nodes = Vec::new();
        while let Some(next) = pending.pop() {
            let Some(node) = self.slots.get_mut(next.0).and_then(Option::take) else {
                panic!("topic tree node {:?} released twice", next);
            };
            pending.extend(node.child_ids());
            self.free.push(next);
            self.live -= 1;
            nodes.push(node);
        }

        PrunedSubtree { nodes }
    }

    /// Prunes the now-inactive branch ending at `id`, if there is one.
    pub fn remove_unused_tree(&mut self, id: NodeId) -> Option<PrunedSubtree<D>> {
        let top = self.identify_inactive_subtree(id)?;
        let pruned = self.detach_subtree(top);
        tracing::debug!("Pruned {} inactive topic tree nodes", pruned.len());
        Some(pruned)
    }

    // --- MATCHING ---

    /// Collects every node whose pattern matches the (wildcard-free) `topic`
    /// and whose payload passes `is_active`. The same node may be reported more
    /// than once when several multicards lie on the path.
    pub fn find_matching<F>(&self, topic: &TopicAnalysis, is_active: F, out: &mut Vec<NodeId>)
    where
        F: Fn(&D) -> bool,
    {
        self.find_matching_from(self.root, topic, 0, &is_active, out);
    }

    fn find_matching_from<F>(&self, parent: NodeId, topic: &TopicAnalysis, index: usize, is_active: &F, out: &mut Vec<NodeId>)
    where
        F: Fn(&D) -> bool,
    {
        let node = self.node(parent);
        let last = index + 1 >= topic.depth();
        let substring = topic.substring(index);

        if let Some(child) = node.children.find(topic.substring_hash(index), |id| &*self.node(id).substring == substring) {
            if last {
                self.add_active_nodes(child, is_active, out);
            } else {
                self.find_matching_from(child, topic, index + 1, is_active, out);
            }
        }

        // Wildcards never match a system prefix substring
        if index < topic.sys_topic_end() {
            return;
        }

        if let Some(wildcard) = node.wildcard_child {
            if last {
                self.add_active_nodes(wildcard, is_active, out);
            } else {
                self.find_matching_from(wildcard, topic, index + 1, is_active, out);
            }
        }

        if let Some(multicard) = node.multicard_child {
            self.add_active_nodes(multicard, is_active, out);

            // The multicard may swallow any number of substrings before a nested pattern resumes
            for next in index..topic.depth() {
                self.find_matching_from(multicard, topic, next, is_active, out);
            }
        }
    }

    fn add_active_nodes<F>(&self, id: NodeId, is_active: &F, out: &mut Vec<NodeId>)
    where
        F: Fn(&D) -> bool,
    {
        let node = self.node(id);
        if is_active(&node.data) {
            out.push(id);
        }

        // A trailing multicard also matches its parent level
        if node.kind != NodeKind::Multicard {
            let mut next = node.multicard_child;
            while let Some(multicard) = next {
                let multicard_node = self.node(multicard);
                if is_active(&multicard_node.data) {
                    out.push(multicard);
                }
                next = multicard_node.multicard_child;
            }
        }
    }

    /// Collects every concrete (normal-path) node that a subscription `pattern`
    /// would match. Used to replay retained messages to a new subscription.
    /// Patterns with several multicards may report a node more than once.
    pub fn find_pattern_matches<F>(&self, pattern: &TopicAnalysis, is_active: F, out: &mut Vec<NodeId>)
    where
        F: Fn(&D) -> bool,
    {
        self.pattern_matches_from(self.root, pattern, 0, &is_active, out);
    }

    fn pattern_matches_from<F>(&self, id: NodeId, pattern: &TopicAnalysis, index: usize, is_active: &F, out: &mut Vec<NodeId>)
    where
        F: Fn(&D) -> bool,
    {
        if index == pattern.depth() {
            // The root carries no topic of its own
            if id != self.root && is_active(&self.node(id).data) {
                out.push(id);
            }
            return;
        }

        let substring = pattern.substring(index);
        match NodeKind::for_substring(substring) {
            NodeKind::Wildcard => {
                for child in self.node(id).children.iter() {
                    if self.matchable_by_wildcard(id, child) {
                        self.pattern_matches_from(child, pattern, index + 1, is_active, out);
                    }
                }
            }
            NodeKind::Multicard => {
                // Zero levels, then every descendant
                let mut stack = vec![id];
                while let Some(next) = stack.pop() {
                    self.pattern_matches_from(next, pattern, index + 1, is_active, out);
                    for child in self.node(next).children.iter() {
                        if self.matchable_by_wildcard(next, child) {
                            stack.push(child);
                        }
                    }
                }
            }
            _ => {
                let hash = pattern.substring_hash(index);
                if let Some(child) = self.node(id).children.find(hash, |c| &*self.node(c).substring == substring) {
                    self.pattern_matches_from(child, pattern, index + 1, is_active, out);
                }
            }
        }
    }

    fn matchable_by_wildcard(&self, parent: NodeId, child: NodeId) -> bool {
        parent != self.root || !self.node(child).is_system_branch()
    }

    // --- WALKING ---

    /// Pre-order walk of the live (not inactive) part of the tree.
    pub fn live_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.live);
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.flags.contains(NodeFlags::INACTIVE) {
                continue;
            }
            out.push(id);
            stack.extend(node.child_ids());
        }
        out
    }

    /// Rebuilds the topic string leading to `id`.
    pub fn topic_path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(next) = current {
            let node = self.node(next);
            if node.kind == NodeKind::Root {
                break;
            }
            parts.push(&*node.substring);
            current = node.parent;
        }
        parts.reverse();
        parts.join("/")
    }

    pub fn snapshot(&self, interest: impl Fn(&D) -> usize) -> TopicNodeSnapshot {
        self.snapshot_from(self.root, &interest)
    }

    fn snapshot_from(&self, id: NodeId, interest: &dyn Fn(&D) -> usize) -> TopicNodeSnapshot {
        let node = self.node(id);
        let mut children: Vec<TopicNodeSnapshot> = node
            .child_ids()
            .map(|child| self.snapshot_from(child, interest))
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));

        TopicNodeSnapshot {
            name: node.substring.to_string(),
            flags: node.flags.bits(),
            interest: interest(&node.data),
            children,
        }
    }
}

/// Removes repeated entries (by `key`) keeping the first occurrence of each.
pub fn dedup_by_identity<T, K, F>(items: &mut Vec<T>, key: F)
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    items.retain(|item| seen.insert(key(item)));
}
