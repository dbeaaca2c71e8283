//! Subscription Tree: local subscriptions indexed by topic pattern.
//!
//! Structural changes take the write lock. Lookups take the read lock, raise the
//! matched subscribers' use counts and hand them out beyond the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::collaborators::ClusterTransport;
use crate::error::{EngineError, Result};
use crate::subscriptions::subscriber::Subscriber;
use crate::topic_tree::{
    dedup_by_identity, Destination, NodeData, NodeFlags, NodeId, TopicAnalysis, TopicNodeSnapshot, TopicPattern, TreeOp, Trie,
};

#[derive(Default)]
pub struct SubsNodeData {
    subscribers: Vec<Arc<Subscriber>>,
    /// Cluster-shared subscriptions plus an active cluster request.
    active_cluster: u32,
}

impl NodeData for SubsNodeData {
    fn has_interest(&self) -> bool {
        !self.subscribers.is_empty() || self.active_cluster > 0
    }
}

struct SubsInner {
    trie: Trie<SubsNodeData>,
    regex: Vec<(Arc<dyn TopicPattern>, Arc<Subscriber>)>,
    // Subscribers attached in more than one place; lookups must dedup while non-zero
    shared_subscribers: usize,
    subscriptions: usize,
}

impl SubsInner {
    fn note_attached(&mut self, subscriber: &Subscriber) {
        if subscriber.attach() == 2 {
            self.shared_subscribers += 1;
        }
        self.subscriptions += 1;
    }

    fn note_detached(&mut self, subscriber: &Subscriber) {
        if subscriber.detach() == 1 {
            self.shared_subscribers = self.shared_subscribers.saturating_sub(1);
        }
        self.subscriptions -= 1;
    }
}

/// Subscribers matched by one lookup, with their use counts raised.
pub struct MatchedSubscribers {
    pub subscribers: Vec<Arc<Subscriber>>,
    /// Subscription generation the lookup saw.
    pub generation: u64,
}

pub struct SubscriptionTree {
    inner: RwLock<SubsInner>,
    cluster: Arc<dyn ClusterTransport>,
    generation: AtomicU64,
}

impl SubscriptionTree {
    pub fn new(cluster: Arc<dyn ClusterTransport>) -> Self {
        Self {
            inner: RwLock::new(SubsInner {
                trie: Trie::new(),
                regex: Vec::new(),
                shared_subscribers: 0,
                subscriptions: 0,
            }),
            cluster,
            generation: AtomicU64::new(0),
        }
    }

    /// Bumped by every change to the set of subscriptions.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    // --- SUBSCRIBE ---

    /// Attaches `subscriber` to `destination`. The tree keeps the passed `Arc`.
    /// The same subscriber on the same pattern answers `ExistingKey`.
    pub fn add_subscription(&self, destination: &Destination, subscriber: Arc<Subscriber>) -> Result<()> {
        let analysis = match destination {
            Destination::Topic(analysis) => analysis,
            Destination::Regex(pattern) => return self.add_regex_subscription(pattern, subscriber),
        };

        let mut inner = self.inner.write();
        let node = inner.trie.insert_or_find(analysis, TreeOp::Add)?;

        if inner.trie.data(node).subscribers.iter().any(|s| Arc::ptr_eq(s, &subscriber)) {
            return Err(EngineError::ExistingKey);
        }

        if inner.trie.data_mut(node).subscribers.try_reserve(1).is_err() {
            let pruned = inner.trie.remove_unused_tree(node);
            drop(inner);
            drop(pruned);
            return Err(EngineError::AllocateError);
        }

        if subscriber.share_with_cluster {
            if let Err(e) = self.add_cluster_interest(&mut inner.trie, node) {
                let pruned = inner.trie.remove_unused_tree(node);
                drop(inner);
                drop(pruned);
                return Err(e);
            }
        }

        inner.note_attached(&subscriber);
        inner.trie.note_interest_added(node);
        inner.trie.data_mut(node).subscribers.push(subscriber);
        self.bump_generation();
        Ok(())
    }

    fn add_regex_subscription(&self, pattern: &Arc<dyn TopicPattern>, subscriber: Arc<Subscriber>) -> Result<()> {
        let mut inner = self.inner.write();
        let exists = inner
            .regex
            .iter()
            .any(|(p, s)| p.source() == pattern.source() && Arc::ptr_eq(s, &subscriber));
        if exists {
            return Err(EngineError::ExistingKey);
        }
        inner.regex.try_reserve(1).map_err(|_| EngineError::AllocateError)?;
        inner.note_attached(&subscriber);
        inner.regex.push((pattern.clone(), subscriber));
        self.bump_generation();
        Ok(())
    }

    // --- UNSUBSCRIBE ---

    pub fn remove_subscription(&self, destination: &Destination, subscriber: &Arc<Subscriber>) -> Result<()> {
        let analysis = match destination {
            Destination::Topic(analysis) => analysis,
            Destination::Regex(pattern) => return self.remove_regex_subscription(pattern, subscriber),
        };

        let mut inner = self.inner.write();
        let node = inner.trie.insert_or_find(analysis, TreeOp::Find)?;

        let position = inner
            .trie
            .data(node)
            .subscribers
            .iter()
            .position(|s| Arc::ptr_eq(s, subscriber))
            .ok_or(EngineError::NotFound)?;

        if subscriber.share_with_cluster {
            self.remove_cluster_interest(&mut inner.trie, node)?;
        }

        let removed = inner.trie.data_mut(node).subscribers.remove(position);
        inner.trie.note_interest_removed(node);
        inner.note_detached(&removed);

        let pruned = inner.trie.remove_unused_tree(node);
        self.bump_generation();
        drop(inner);

        // Released outside the lock
        drop(pruned);
        drop(removed);
        Ok(())
    }

    fn remove_regex_subscription(&self, pattern: &Arc<dyn TopicPattern>, subscriber: &Arc<Subscriber>) -> Result<()> {
        let mut inner = self.inner.write();
        let position = inner
            .regex
            .iter()
            .position(|(p, s)| p.source() == pattern.source() && Arc::ptr_eq(s, subscriber))
            .ok_or(EngineError::NotFound)?;
        let (_, removed) = inner.regex.remove(position);
        inner.note_detached(&removed);
        self.bump_generation();
        drop(inner);
        drop(removed);
        Ok(())
    }

    // --- CLUSTER INTEREST ---

    // Tells the cluster on the 0 -> 1 transition. On failure the count is restored.
    fn add_cluster_interest(&self, trie: &mut Trie<SubsNodeData>, node: NodeId) -> Result<()> {
        trie.data_mut(node).active_cluster += 1;
        if trie.data(node).active_cluster == 1 {
            let wildcard = trie.node(node).flags().contains(NodeFlags::BRANCH_WILD_OR_MULTI);
            let pattern = trie.topic_path(node);
            if let Err(e) = self.cluster.add_cluster_subscription_interest(&pattern, wildcard) {
                trie.data_mut(node).active_cluster -= 1;
                tracing::warn!("Cluster rejected interest in '{}': {}", pattern, e);
                return Err(e);
            }
        }
        Ok(())
    }

    fn remove_cluster_interest(&self, trie: &mut Trie<SubsNodeData>, node: NodeId) -> Result<()> {
        trie.data_mut(node).active_cluster -= 1;
        if trie.data(node).active_cluster == 0 {
            let wildcard = trie.node(node).flags().contains(NodeFlags::BRANCH_WILD_OR_MULTI);
            let pattern = trie.topic_path(node);
            match self.cluster.remove_cluster_subscription_interest(&pattern, wildcard) {
                Ok(()) | Err(EngineError::NotFound) => {}
                Err(e) => {
                    trie.data_mut(node).active_cluster += 1;
                    tracing::warn!("Cluster refused to drop interest in '{}': {}", pattern, e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Marks `topic` as requested by the cluster, keeping its node (and cluster interest) alive.
    pub fn activate_cluster_requested_topic(&self, topic: &str) -> Result<()> {
        let analysis = TopicAnalysis::new(topic)?;
        let mut inner = self.inner.write();
        let node = inner.trie.insert_or_find(&analysis, TreeOp::Add)?;

        if inner.trie.node(node).flags().contains(NodeFlags::CLUSTER_REQUESTED_TOPIC) {
            return Err(EngineError::ExistingKey);
        }

        if let Err(e) = self.add_cluster_interest(&mut inner.trie, node) {
            let pruned = inner.trie.remove_unused_tree(node);
            drop(inner);
            drop(pruned);
            return Err(e);
        }
        inner.trie.node_mut(node).flags.insert(NodeFlags::CLUSTER_REQUESTED_TOPIC);
        Ok(())
    }

    pub fn deactivate_cluster_requested_topic(&self, topic: &str) -> Result<()> {
        let analysis = TopicAnalysis::new(topic)?;
        let mut inner = self.inner.write();
        let node = inner.trie.insert_or_find(&analysis, TreeOp::Find)?;

        if !inner.trie.node(node).flags().contains(NodeFlags::CLUSTER_REQUESTED_TOPIC) {
            return Err(EngineError::NotFound);
        }

        self.remove_cluster_interest(&mut inner.trie, node)?;
        inner.trie.node_mut(node).flags.remove(NodeFlags::CLUSTER_REQUESTED_TOPIC);

        let pruned = inner.trie.remove_unused_tree(node);
        drop(inner);
        drop(pruned);
        Ok(())
    }

    // --- LOOKUP ---

    /// Every subscriber whose pattern matches `topic`, each exactly once.
    pub fn find_subscribers(&self, topic: &TopicAnalysis) -> MatchedSubscribers {
        let inner = self.inner.read();

        let mut nodes = Vec::new();
        inner.trie.find_matching(topic, |data| !data.subscribers.is_empty(), &mut nodes);
        if inner.trie.multi_multi_interest() > 0 {
            dedup_by_identity(&mut nodes, |id| *id);
        }

        let mut subscribers: Vec<Arc<Subscriber>> = nodes
            .iter()
            .flat_map(|id| inner.trie.data(*id).subscribers.iter().cloned())
            .collect();

        subscribers.extend(
            inner
                .regex
                .iter()
                .filter(|(pattern, _)| pattern.is_match(topic.topic()))
                .map(|(_, subscriber)| subscriber.clone()),
        );

        if inner.shared_subscribers > 0 {
            dedup_by_identity(&mut subscribers, |s| Arc::as_ptr(s));
        }

        for subscriber in &subscribers {
            subscriber.acquire();
        }

        MatchedSubscribers {
            subscribers,
            generation: self.generation(),
        }
    }

    // --- DIAGNOSTICS ---

    pub fn subscription_count(&self) -> usize {
        self.inner.read().subscriptions
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().trie.len()
    }

    pub fn snapshot(&self) -> TopicNodeSnapshot {
        self.inner.read().trie.snapshot(|data| data.subscribers.len())
    }
}
