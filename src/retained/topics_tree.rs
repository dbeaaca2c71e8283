//! Topics Tree: retained messages, the origin server index and topic monitors.
//!
//! One `parking_lot::RwLock` covers the trie and the origin lists threaded
//! through it. Store calls are made with the lock released; a node with a
//! pending update cannot be pruned, so its id stays valid until the update
//! is finished.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::collaborators::{RetainedStore, StoreCall, StoreHandle};
use crate::config::{MaintenanceConfig, StoreConfig};
use crate::error::{EngineError, Result};
use crate::retained::message::RetainedMessage;
use crate::retained::origin::{OriginEntry, OriginLinks, OriginServer, OriginServerStats};
use crate::retained::topic_stats::{PublishOutcome, TopicStats, TopicStatsSnapshot};
use crate::topic_tree::{
    dedup_by_identity, validate_topic_string, NodeData, NodeId, TopicAnalysis, TopicNodeSnapshot, TreeOp, Trie, ValidateMode,
};

// ==========================================
// NODE PAYLOAD
// ==========================================

#[derive(Debug)]
pub(crate) struct CurrentRetained {
    pub(crate) message: Arc<RetainedMessage>,
    /// Vote for the lowest order id the store must keep (0 for non-persistent).
    pub(crate) order_id: u64,
    pub(crate) store_handle: Option<StoreHandle>,
}

#[derive(Default)]
pub struct TopicNodeData {
    pub(crate) retained: Option<CurrentRetained>,
    pub(crate) links: OriginLinks,
    pub(crate) pending_updates: u32,
    pub(crate) inflight_timestamps: Vec<u64>,
    pub(crate) stats: Option<TopicStats>,
}

impl NodeData for TopicNodeData {
    fn has_interest(&self) -> bool {
        self.retained.is_some() || self.pending_updates > 0 || self.stats.is_some()
    }
}

impl OriginEntry for TopicNodeData {
    fn origin_links(&self) -> &OriginLinks {
        &self.links
    }

    fn origin_links_mut(&mut self) -> &mut OriginLinks {
        &mut self.links
    }

    fn retained_timestamp(&self) -> u64 {
        self.retained.as_ref().map_or(0, |current| current.message.timestamp)
    }
}

struct TopicsInner {
    trie: Trie<TopicNodeData>,
    origins: HashMap<String, OriginServer>,
    server_uid: String,
    next_order_id: u64,
    retained_updates: u64,
}

impl TopicsInner {
    fn origin_server(&mut self, uid: &str) -> &mut OriginServer {
        let local = uid == self.server_uid;
        self.origins
            .entry(uid.to_string())
            .or_insert_with(|| OriginServer::new(uid, local))
    }

    /// Takes the node's retained message off its origin list and the node.
    fn unlink_retained(&mut self, id: NodeId) -> Option<CurrentRetained> {
        let uid = self.trie.data(id).retained.as_ref()?.message.origin_server.clone();
        if let Some(origin) = self.origins.get_mut(&uid) {
            origin.remove(&mut self.trie, id);
        }
        self.trie.data_mut(id).retained.take()
    }

    fn link_retained(&mut self, id: NodeId, current: CurrentRetained) {
        let uid = current.message.origin_server.clone();
        self.trie.data_mut(id).retained = Some(current);
        self.origin_server(&uid);
        if let Some(origin) = self.origins.get_mut(&uid) {
            origin.insert(&mut self.trie, id);
        }
    }
}

// ==========================================
// PUBLIC RESULT TYPES
// ==========================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetainedOptions {
    /// Report superseded timestamps as `OldTimestamp` instead of `Superseded`.
    pub potential_republish: bool,
    /// Re-store the node's current message under a fresh order id.
    pub repositioning: bool,
}

pub enum RetainedOutcome {
    Prepared(PreparedRetained),
    /// The store answers asynchronously; `complete` resumes the update.
    Pending(PendingRetained),
    /// An equal or newer retained message already exists for the topic.
    Superseded,
}

/// A retained update that has reserved its node (and store record). Promote it
/// with `commit`; dropping it rolls the update back.
pub struct PreparedRetained {
    tree: Arc<TopicsTree>,
    node: NodeId,
    message: Arc<RetainedMessage>,
    order_id: u64,
    store_handle: Option<StoreHandle>,
    repositioning: bool,
    finished: bool,
}

impl PreparedRetained {
    pub fn message(&self) -> &Arc<RetainedMessage> {
        &self.message
    }

    pub fn order_id(&self) -> u64 {
        self.order_id
    }

    /// Makes the message the topic's current retained message unless a newer one
    /// got there first. Returns whether it was promoted.
    pub fn commit(mut self) -> Result<bool> {
        self.finished = true;
        self.tree.finish_prepared(&self, true)
    }
}

impl Drop for PreparedRetained {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Err(e) = self.tree.finish_prepared(self, false) {
                tracing::warn!("Rolling back retained update for '{}' failed: {}", self.message.topic, e);
            }
        }
    }
}

/// A prepared update waiting on an asynchronous store answer. Dropping it (or
/// the future driving `complete`) rolls the update back; a store record that
/// still arrives afterwards is deleted again.
pub struct PendingRetained {
    prepared: Option<PreparedRetained>,
    rx: Option<oneshot::Receiver<Result<StoreHandle>>>,
}

impl PendingRetained {
    fn new(prepared: PreparedRetained, rx: oneshot::Receiver<Result<StoreHandle>>) -> Self {
        Self {
            prepared: Some(prepared),
            rx: Some(rx),
        }
    }

    pub fn message(&self) -> Option<&Arc<RetainedMessage>> {
        self.prepared.as_ref().map(|prepared| &prepared.message)
    }

    /// Waits for the store and finishes the bookkeeping the synchronous path would have done.
    pub async fn complete(mut self) -> Result<PreparedRetained> {
        let mut attempts = 0;
        loop {
            let Some(rx) = self.rx.as_mut() else {
                return Err(EngineError::Store("retained store answer already taken".to_string()));
            };
            let answer = match rx.await {
                Ok(answer) => answer,
                Err(_) => Err(EngineError::Store("store completion dropped".to_string())),
            };
            self.rx = None;

            let call = match answer {
                Ok(handle) => StoreCall::ok(handle),
                Err(EngineError::StoreGenerationFull) if attempts < self.store_retries() => {
                    attempts += 1;
                    let Some(prepared) = self.prepared.as_ref() else {
                        return Err(EngineError::Store("retained update already taken".to_string()));
                    };
                    prepared.tree.store.rollback();
                    prepared.tree.store_message(&prepared.message, prepared.order_id)
                }
                Err(e) => return Err(e),
            };

            match call.try_completed() {
                Ok(Ok(handle)) => {
                    let Some(mut prepared) = self.prepared.take() else {
                        return Err(EngineError::Store("retained update already taken".to_string()));
                    };
                    prepared.store_handle = Some(handle);
                    return Ok(prepared);
                }
                Ok(Err(e)) => return Err(e),
                Err(rx) => self.rx = Some(rx),
            }
        }
    }

    fn store_retries(&self) -> u32 {
        self.prepared.as_ref().map_or(0, |prepared| prepared.tree.store_retries)
    }
}

impl Drop for PendingRetained {
    fn drop(&mut self) {
        let (Some(rx), Some(prepared)) = (self.rx.take(), self.prepared.as_ref()) else {
            return;
        };
        let store = prepared.tree.store.clone();
        let topic = prepared.message.topic.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Ok(Ok(handle)) = rx.await {
                        tracing::debug!("Deleting late store record of abandoned retained update for '{}'", topic);
                        finish_store_call(store.delete_stored_message(handle), "delete retained reference");
                        finish_store_call(store.commit(), "commit");
                    }
                });
            }
            Err(_) => tracing::warn!("Abandoned retained update for '{}' may leave a store record behind", topic),
        }
    }
}

/// Retained messages handed out beyond the lock. Each carries two use counts
/// (handle + store copy) until the batch is dropped.
#[derive(Debug, Default)]
pub struct RetainedBatch {
    messages: Vec<Arc<RetainedMessage>>,
}

impl RetainedBatch {
    // Caller holds the tree lock
    fn push(&mut self, message: &Arc<RetainedMessage>) {
        message.acquire(2);
        self.messages.push(message.clone());
    }

    pub fn messages(&self) -> &[Arc<RetainedMessage>] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RetainedMessage>> {
        self.messages.iter()
    }
}

impl Drop for RetainedBatch {
    fn drop(&mut self) {
        for message in &self.messages {
            message.release(2);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetainedScan {
    pub min_active_order_id: u64,
    pub max_active_order_id: u64,
    pub active_count: usize,
    pub repositioned: usize,
}

// ==========================================
// TOPICS TREE
// ==========================================

pub struct TopicsTree {
    inner: RwLock<TopicsInner>,
    store: Arc<dyn RetainedStore>,
    store_retries: u32,
    maintenance: MaintenanceConfig,
    min_active_order_id: AtomicU64,
    reposition_in_progress: AtomicBool,
}

impl TopicsTree {
    pub fn new(server_uid: &str, store: Arc<dyn RetainedStore>, store_config: &StoreConfig, maintenance: &MaintenanceConfig) -> Self {
        Self {
            inner: RwLock::new(TopicsInner {
                trie: Trie::new(),
                origins: HashMap::new(),
                server_uid: server_uid.to_string(),
                next_order_id: 0,
                retained_updates: 0,
            }),
            store,
            store_retries: store_config.generation_full_retries,
            maintenance: maintenance.clone(),
            min_active_order_id: AtomicU64::new(0),
            reposition_in_progress: AtomicBool::new(false),
        }
    }

    // --- RETAINED UPDATE ---

    pub fn prepare_retained(self: &Arc<Self>, message: Arc<RetainedMessage>, options: RetainedOptions) -> Result<RetainedOutcome> {
        let analysis = TopicAnalysis::new(&message.topic)?;
        if analysis.has_wildcards() {
            return Err(EngineError::InvalidTopic(format!("retained topic '{}' contains wildcards", message.topic)));
        }

        let mut inner = self.inner.write();
        let op = if options.repositioning { TreeOp::Find } else { TreeOp::Add };
        let node = inner.trie.insert_or_find(&analysis, op)?;

        let data = inner.trie.data(node);
        let current = data.retained_timestamp();
        let highest_inflight = data.inflight_timestamps.iter().copied().max().unwrap_or(0);

        let rejection = if options.repositioning {
            (message.timestamp != current).then_some(EngineError::NotFound)
        } else if message.timestamp <= current || message.timestamp <= highest_inflight {
            Some(EngineError::OldTimestamp)
        } else {
            None
        };

        if let Some(rejection) = rejection {
            let pruned = inner.trie.remove_unused_tree(node);
            drop(inner);
            drop(pruned);

            tracing::debug!(
                "Retained update for '{}' at {} not applied (current {}, in-flight {})",
                message.topic, message.timestamp, current, highest_inflight
            );
            return match rejection {
                EngineError::OldTimestamp if !options.potential_republish => Ok(RetainedOutcome::Superseded),
                e => Err(e),
            };
        }

        inner.origin_server(&message.origin_server);

        let order_id = if message.persistent && !message.is_clear() {
            inner.next_order_id += 1;
            inner.next_order_id
        } else {
            0
        };

        let data = inner.trie.data_mut(node);
        data.pending_updates += 1;
        data.inflight_timestamps.push(message.timestamp);
        inner.retained_updates += 1;
        drop(inner);

        let mut prepared = PreparedRetained {
            tree: self.clone(),
            node,
            message,
            order_id,
            store_handle: None,
            repositioning: options.repositioning,
            finished: false,
        };

        if order_id == 0 {
            return Ok(RetainedOutcome::Prepared(prepared));
        }

        match self.store_message(&prepared.message, order_id).try_completed() {
            Ok(Ok(handle)) => {
                prepared.store_handle = Some(handle);
                Ok(RetainedOutcome::Prepared(prepared))
            }
            Ok(Err(e)) => Err(e),
            Err(rx) => Ok(RetainedOutcome::Pending(PendingRetained::new(prepared, rx))),
        }
    }

    // Store the message, rolling back and retrying while the store generation is full
    fn store_message(&self, message: &RetainedMessage, order_id: u64) -> StoreCall<StoreHandle> {
        let mut attempts = 0;
        loop {
            match self.store.store_retained_message(message, order_id, 1) {
                StoreCall::Completed(Err(EngineError::StoreGenerationFull)) if attempts < self.store_retries => {
                    attempts += 1;
                    tracing::debug!("Store generation full storing retained '{}', retry {}", message.topic, attempts);
                    self.store.rollback();
                }
                other => return other,
            }
        }
    }

    fn finish_prepared(&self, prepared: &PreparedRetained, promote: bool) -> Result<bool> {
        let node = prepared.node;
        let message = &prepared.message;
        let mut unstore: Vec<StoreHandle> = Vec::new();
        let mut replaced = None;

        let mut inner = self.inner.write();
        {
            let data = inner.trie.data_mut(node);
            data.pending_updates -= 1;
            if let Some(pos) = data.inflight_timestamps.iter().position(|ts| *ts == message.timestamp) {
                data.inflight_timestamps.swap_remove(pos);
            }
        }

        let promoted = if !promote {
            unstore.extend(prepared.store_handle);
            false
        } else if prepared.repositioning {
            match inner.trie.data_mut(node).retained.as_mut() {
                Some(current) if Arc::ptr_eq(&current.message, message) => {
                    unstore.extend(std::mem::replace(&mut current.store_handle, prepared.store_handle));
                    current.order_id = prepared.order_id;
                    true
                }
                _ => {
                    unstore.extend(prepared.store_handle);
                    false
                }
            }
        } else if message.timestamp > inner.trie.data(node).retained_timestamp() {
            if let Some(old) = inner.unlink_retained(node) {
                unstore.extend(old.store_handle);
                replaced = Some(old);
            }
            if !message.is_clear() {
                inner.link_retained(node, CurrentRetained {
                    message: message.clone(),
                    order_id: prepared.order_id,
                    store_handle: prepared.store_handle,
                });
            }
            inner.retained_updates += 1;
            true
        } else {
            unstore.extend(prepared.store_handle);
            false
        };

        let pruned = inner.trie.remove_unused_tree(node);
        drop(inner);
        drop(pruned);
        drop(replaced);

        if prepared.store_handle.is_some() || !unstore.is_empty() {
            self.unstore(unstore);
        }
        Ok(promoted)
    }

    fn unstore(&self, handles: Vec<StoreHandle>) {
        for handle in handles {
            finish_store_call(self.store.delete_stored_message(handle), "delete retained reference");
        }
        finish_store_call(self.store.commit(), "commit");
    }

    /// Removes the retained message of an exact topic.
    pub fn clear_retained(&self, topic: &str) -> Result<()> {
        let analysis = TopicAnalysis::new(topic)?;
        if analysis.has_wildcards() {
            return Err(EngineError::InvalidTopic(format!("retained topic '{}' contains wildcards", topic)));
        }

        let mut inner = self.inner.write();
        let node = inner.trie.insert_or_find(&analysis, TreeOp::Find)?;
        let old = inner.unlink_retained(node).ok_or(EngineError::NotFound)?;
        inner.retained_updates += 1;
        let pruned = inner.trie.remove_unused_tree(node);
        drop(inner);
        drop(pruned);

        self.unstore(old.store_handle.into_iter().collect());
        Ok(())
    }

    pub fn retained_message(&self, topic: &str) -> Result<Arc<RetainedMessage>> {
        let analysis = TopicAnalysis::new(topic)?;
        let inner = self.inner.read();
        let node = inner.trie.find(&analysis)?;
        inner
            .trie
            .data(node)
            .retained
            .as_ref()
            .map(|current| current.message.clone())
            .ok_or(EngineError::NotFound)
    }

    // --- RETAINED LOOKUP ---

    /// Retained messages from one origin server (or, with `None`, from every
    /// record flagged as this server), oldest first. System topics are never returned.
    pub fn find_origin_server_retained_messages(&self, server_uid: Option<&str>, newer_than: Option<u64>) -> Result<RetainedBatch> {
        let inner = self.inner.read();
        let servers: Vec<&OriginServer> = match server_uid {
            Some(uid) => vec![inner.origins.get(uid).ok_or(EngineError::NotFound)?],
            None => inner.origins.values().filter(|origin| origin.is_local()).collect(),
        };

        let mut batch = RetainedBatch::default();
        for origin in servers {
            for id in origin.nodes(&inner.trie) {
                if inner.trie.node(id).is_system_branch() {
                    continue;
                }
                let Some(current) = inner.trie.data(id).retained.as_ref() else { continue };
                if newer_than.is_some_and(|cutoff| current.message.timestamp <= cutoff) {
                    continue;
                }
                batch.push(&current.message);
            }
        }
        Ok(batch)
    }

    pub fn release_origin_server_retained_messages(&self, batch: RetainedBatch) {
        drop(batch);
        finish_store_call(self.store.commit(), "commit");
    }

    /// Retained messages a new subscription on `pattern` should receive.
    pub fn find_retained_for_subscription(&self, pattern: &str) -> Result<RetainedBatch> {
        let analysis = TopicAnalysis::new(pattern)?;
        let inner = self.inner.read();
        let mut nodes = Vec::new();
        inner.trie.find_pattern_matches(&analysis, |data| data.retained.is_some(), &mut nodes);
        if analysis.multicards().len() > 1 {
            dedup_by_identity(&mut nodes, |id| *id);
        }

        let mut batch = RetainedBatch::default();
        for id in nodes {
            if let Some(current) = inner.trie.data(id).retained.as_ref() {
                batch.push(&current.message);
            }
        }
        Ok(batch)
    }

    // --- ORIGIN SERVER STATS ---

    pub fn origin_server_stats(&self) -> Vec<(String, OriginServerStats)> {
        let inner = self.inner.read();
        let mut stats: Vec<(String, OriginServerStats)> = inner
            .origins
            .values()
            .map(|origin| (origin.uid().to_string(), *origin.stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub fn origin_server_topics(&self, server_uid: &str) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let origin = inner.origins.get(server_uid).ok_or(EngineError::NotFound)?;
        Ok(origin
            .nodes(&inner.trie)
            .into_iter()
            .map(|id| inner.trie.topic_path(id))
            .collect())
    }

    // --- MIN ACTIVE ORDER ID SCAN ---

    pub fn min_active_order_id(&self) -> u64 {
        self.min_active_order_id.load(Ordering::Acquire)
    }

    /// Recomputes the lowest order id any retained message still needs and hands it
    /// to the store. When the ids in use are sparse and spread out, the oldest
    /// messages are re-stored under new ids so the store can reclaim the old ones.
    pub async fn scan_for_min_active_order_id(self: &Arc<Self>, allow_reposition: bool) -> RetainedScan {
        let mut scan = RetainedScan::default();

        let to_reposition = {
            let inner = self.inner.read();
            let batch = self.maintenance.reposition_batch.max(1);
            let mut lowest: BinaryHeap<(u64, NodeId)> = BinaryHeap::with_capacity(batch + 1);
            let mut min = u64::MAX;
            let mut max = 0;

            for id in inner.trie.live_nodes() {
                let Some(current) = inner.trie.data(id).retained.as_ref() else { continue };
                if current.order_id == 0 {
                    continue;
                }
                min = min.min(current.order_id);
                max = max.max(current.order_id);
                scan.active_count += 1;

                lowest.push((current.order_id, id));
                if lowest.len() > batch {
                    lowest.pop();
                }
            }

            scan.min_active_order_id = if scan.active_count == 0 { inner.next_order_id + 1 } else { min };
            scan.max_active_order_id = max;
            self.store.set_min_active_order_id(scan.min_active_order_id);
            self.min_active_order_id.store(scan.min_active_order_id, Ordering::Release);

            let spread = max.saturating_sub(min);
            let in_use_pct = if scan.active_count == 0 {
                100.0
            } else {
                scan.active_count as f64 * 100.0 / (spread + 1) as f64
            };
            let wanted = allow_reposition
                && scan.active_count > 0
                && spread > self.maintenance.reposition_min_spread
                && in_use_pct < self.maintenance.reposition_max_in_use_pct;

            if wanted
                && self
                    .reposition_in_progress
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                let messages: Vec<Arc<RetainedMessage>> = lowest
                    .into_sorted_vec()
                    .into_iter()
                    .filter_map(|(_, id)| inner.trie.data(id).retained.as_ref().map(|c| c.message.clone()))
                    .collect();
                for message in &messages {
                    message.acquire(1);
                }
                Some(messages)
            } else {
                None
            }
        };

        if let Some(messages) = to_reposition {
            for message in messages {
                match self.reposition_retained(message.clone()).await {
                    Ok(true) => scan.repositioned += 1,
                    Ok(false) => {}
                    Err(EngineError::NotFound) => {}
                    Err(e) => tracing::warn!("Repositioning retained '{}' failed: {}", message.topic, e),
                }
                message.release(1);
            }
            self.reposition_in_progress.store(false, Ordering::Release);
            tracing::info!(
                "Retained scan repositioned {} messages (min order id {}, max {})",
                scan.repositioned, scan.min_active_order_id, scan.max_active_order_id
            );
        }

        scan
    }

    async fn reposition_retained(self: &Arc<Self>, message: Arc<RetainedMessage>) -> Result<bool> {
        let options = RetainedOptions { repositioning: true, ..RetainedOptions::default() };
        let prepared = match self.prepare_retained(message, options)? {
            RetainedOutcome::Prepared(prepared) => prepared,
            RetainedOutcome::Pending(pending) => pending.complete().await?,
            RetainedOutcome::Superseded => return Ok(false),
        };
        prepared.commit()
    }

    // --- TOPIC MONITORS ---

    pub fn activate_topic_stats(&self, pattern: &str, reset: bool) -> Result<()> {
        if !validate_topic_string(pattern, ValidateMode::TopicMonitor) {
            return Err(EngineError::InvalidTopic(format!("'{}' is not a topic monitor pattern", pattern)));
        }
        let analysis = TopicAnalysis::new(pattern)?;

        let mut inner = self.inner.write();
        let node = inner.trie.insert_or_find(&analysis, TreeOp::Add)?;
        let data = inner.trie.data_mut(node);
        if let Some(stats) = data.stats.as_ref() {
            if reset {
                stats.reset();
            }
        } else {
            data.stats = Some(TopicStats::default());
        }
        tracing::debug!("Topic stats active for '{}'", pattern);
        Ok(())
    }

    pub fn deactivate_topic_stats(&self, pattern: &str) -> Result<()> {
        let analysis = TopicAnalysis::new(pattern)?;
        let mut inner = self.inner.write();
        let node = inner.trie.insert_or_find(&analysis, TreeOp::Find)?;
        inner.trie.data_mut(node).stats.take().ok_or(EngineError::NotFound)?;
        let pruned = inner.trie.remove_unused_tree(node);
        drop(inner);
        drop(pruned);
        Ok(())
    }

    pub fn topic_stats(&self, pattern: &str) -> Result<TopicStatsSnapshot> {
        let analysis = TopicAnalysis::new(pattern)?;
        let inner = self.inner.read();
        let node = inner.trie.find(&analysis)?;
        inner
            .trie
            .data(node)
            .stats
            .as_ref()
            .map(|stats| stats.snapshot(pattern.to_string()))
            .ok_or(EngineError::NotFound)
    }

    /// Counts a publish against every monitor whose pattern matches `topic`.
    pub fn record_publish(&self, topic: &TopicAnalysis, outcome: PublishOutcome) {
        let inner = self.inner.read();
        let mut monitors = Vec::new();
        inner.trie.find_matching(topic, |data| data.stats.is_some(), &mut monitors);
        for id in monitors {
            if let Some(stats) = inner.trie.data(id).stats.as_ref() {
                stats.record(outcome);
            }
        }
    }

    // --- DIAGNOSTICS ---

    pub fn snapshot(&self) -> TopicNodeSnapshot {
        self.inner.read().trie.snapshot(|data| data.retained.is_some() as usize)
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().trie.len()
    }

    pub fn retained_updates(&self) -> u64 {
        self.inner.read().retained_updates
    }
}

/// Finishes a store call whose result only needs logging. Pending calls are
/// observed on the current runtime if there is one.
pub(crate) fn finish_store_call(call: StoreCall<()>, what: &'static str) {
    match call.try_completed() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Store {} failed: {}", what, e),
        Err(rx) => match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = StoreCall::Pending(rx).wait().await {
                        tracing::warn!("Store {} failed: {}", what, e);
                    }
                });
            }
            Err(_) => tracing::debug!("Store {} completing without a runtime to observe it", what),
        },
    }
}
