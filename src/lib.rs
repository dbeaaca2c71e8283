pub mod collaborators;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod remote;
pub mod retained;
pub mod subscriptions;
pub mod topic_tree;
pub mod utils;

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::collaborators::{ClusterTransport, RetainedStore};
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::remote::{RemoteServer, RemoteServerTree, ServerSelection};
use crate::retained::{
    PublishOutcome, RetainedBatch, RetainedMessage, RetainedOptions, RetainedOutcome, TopicStatsSnapshot, TopicsTree,
};
use crate::subscriptions::{ClientId, Subscriber, SubscriberList, SubscriptionTree};
use crate::topic_tree::{Destination, TopicAnalysis, ValidateMode};
use crate::utils::utils_time::next_server_timestamp;

// ========================================
// ENGINE (The Singleton)
// ========================================

/// Process-wide handle over the subscription, remote-server and topics trees.
/// Cheap to clone (all fields are Arcs).
#[derive(Clone)]
pub struct TopicEngine {
    subscriptions: Arc<SubscriptionTree>,
    remote_servers: Arc<RemoteServerTree>,
    topics: Arc<TopicsTree>,
    cluster: Arc<dyn ClusterTransport>,
    config: Arc<Config>,
    // Reverse index: ClientId -> subscriptions, for cleanup on disconnect
    client_subscriptions: Arc<DashMap<ClientId, Vec<(Destination, Arc<Subscriber>)>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TopicEngine {
    pub fn new(config: &Config, store: Arc<dyn RetainedStore>, cluster: Arc<dyn ClusterTransport>) -> Self {
        tracing::info!("Topic engine starting as server '{}'", config.engine.server_uid);
        Self {
            subscriptions: Arc::new(SubscriptionTree::new(cluster.clone())),
            remote_servers: Arc::new(RemoteServerTree::new()),
            topics: Arc::new(TopicsTree::new(&config.engine.server_uid, store, &config.store, &config.maintenance)),
            cluster,
            config: Arc::new(config.clone()),
            client_subscriptions: Arc::new(DashMap::new()),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn server_uid(&self) -> &str {
        &self.config.engine.server_uid
    }

    pub fn subscriptions(&self) -> &SubscriptionTree {
        &self.subscriptions
    }

    pub fn remote_servers(&self) -> &RemoteServerTree {
        &self.remote_servers
    }

    pub fn topics(&self) -> &Arc<TopicsTree> {
        &self.topics
    }

    // --- TOPIC STRINGS ---

    pub fn analyze_topic(&self, topic: &str) -> Result<TopicAnalysis> {
        topic_tree::analyze_topic(topic)
    }

    pub fn validate_topic_string(&self, topic: &str, mode: ValidateMode) -> bool {
        topic_tree::validate_topic_string(topic, mode)
    }

    // --- SUBSCRIPTIONS ---

    /// Returns false when the subscriber already had this subscription.
    pub fn add_subscription(&self, destination: &Destination, subscriber: Arc<Subscriber>) -> Result<bool> {
        match self.subscriptions.add_subscription(destination, subscriber.clone()) {
            Ok(()) => {}
            Err(EngineError::ExistingKey) => return Ok(false),
            Err(e) => return Err(e),
        }

        self.client_subscriptions
            .entry(subscriber.client.clone())
            .or_default()
            .push((destination.clone(), subscriber));
        Ok(true)
    }

    /// Returns false when there was nothing to remove.
    pub fn remove_subscription(&self, destination: &Destination, subscriber: &Arc<Subscriber>) -> Result<bool> {
        match self.subscriptions.remove_subscription(destination, subscriber) {
            Ok(()) => {}
            Err(EngineError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        }

        if let Some(mut entries) = self.client_subscriptions.get_mut(&subscriber.client) {
            entries.retain(|(d, s)| !(d.source() == destination.source() && Arc::ptr_eq(s, subscriber)));
        }
        self.client_subscriptions.remove_if(&subscriber.client, |_, entries| entries.is_empty());
        Ok(true)
    }

    /// Drops every subscription a client holds. Returns how many were removed.
    pub fn disconnect_client(&self, client: &ClientId) -> usize {
        let Some((_, entries)) = self.client_subscriptions.remove(client) else {
            return 0;
        };

        let mut removed = 0;
        for (destination, subscriber) in entries {
            match self.subscriptions.remove_subscription(&destination, &subscriber) {
                Ok(()) => removed += 1,
                Err(EngineError::NotFound) => {}
                Err(e) => tracing::warn!("Client {:?} leaving '{}': {}", client, destination.source(), e),
            }
        }
        tracing::debug!("Client {:?} disconnected, {} subscriptions removed", client, removed);
        removed
    }

    pub fn client_subscription_count(&self, client: &ClientId) -> usize {
        self.client_subscriptions.get(client).map_or(0, |entries| entries.len())
    }

    // --- PUBLISH ---

    /// Local subscribers and interested remote servers for a publish to `topic`.
    pub fn get_subscriber_list(&self, topic: &str) -> Result<SubscriberList> {
        let analysis = TopicAnalysis::new(topic)?;
        if analysis.has_wildcards() {
            return Err(EngineError::InvalidTopic(format!("cannot publish to wildcard topic '{}'", topic)));
        }

        let matched = self.subscriptions.find_subscribers(&analysis);
        // NotFound is the only failure: no server wants this topic
        let remote = self.remote_servers.get_remote_servers(&analysis).ok();

        let list = SubscriberList::new(topic, matched.generation, matched.subscribers, remote);
        let outcome = if list.is_empty() { PublishOutcome::NoSubscribers } else { PublishOutcome::Delivered };
        self.topics.record_publish(&analysis, outcome);
        Ok(list)
    }

    /// Counts a publish the broker could not deliver against matching topic monitors.
    pub fn record_publish_failure(&self, topic: &str) -> Result<()> {
        let analysis = TopicAnalysis::new(topic)?;
        self.topics.record_publish(&analysis, PublishOutcome::Failed);
        Ok(())
    }

    /// A retained message originating on this server, stamped with the next server timestamp.
    pub fn local_retained_message(&self, topic: &str, payload: Bytes, persistent: bool) -> Arc<RetainedMessage> {
        Arc::new(RetainedMessage::new(topic, payload, self.server_uid(), next_server_timestamp(), persistent))
    }

    /// Subscriber list for a retained publish, carrying the prepared retained update.
    /// A superseded message is still delivered but not retained.
    pub async fn publish_retained(&self, message: Arc<RetainedMessage>, options: RetainedOptions) -> Result<SubscriberList> {
        let mut list = self.get_subscriber_list(&message.topic)?;
        match self.topics.prepare_retained(message, options)? {
            RetainedOutcome::Prepared(prepared) => list.attach_retained(prepared),
            RetainedOutcome::Pending(pending) => list.attach_retained(pending.complete().await?),
            RetainedOutcome::Superseded => {
                tracing::debug!("Retained publish on '{}' superseded", list.topic());
            }
        }
        Ok(list)
    }

    /// Releases the list's use counts. Returns whether a retained message was promoted.
    pub fn release_subscriber_list(&self, list: SubscriberList) -> Result<bool> {
        list.release()
    }

    /// Current subscription generation, to compare against `SubscriberList::publish_suv`.
    pub fn subscription_generation(&self) -> u64 {
        self.subscriptions.generation()
    }

    // --- RETAINED ---

    pub fn clear_retained(&self, topic: &str) -> Result<()> {
        self.topics.clear_retained(topic)
    }

    pub fn find_retained_for_subscription(&self, pattern: &str) -> Result<RetainedBatch> {
        self.topics.find_retained_for_subscription(pattern)
    }

    pub fn find_origin_server_retained_messages(&self, server_uid: Option<&str>, newer_than: Option<u64>) -> Result<RetainedBatch> {
        self.topics.find_origin_server_retained_messages(server_uid, newer_than)
    }

    pub fn release_origin_server_retained_messages(&self, batch: RetainedBatch) {
        self.topics.release_origin_server_retained_messages(batch)
    }

    /// Pushes every origin server's stats blob to the cluster. Returns how many were accepted.
    pub fn report_retained_stats(&self) -> usize {
        let mut reported = 0;
        for (uid, stats) in self.topics.origin_server_stats() {
            let blob = match stats.to_blob() {
                Ok(blob) => blob,
                Err(e) => {
                    tracing::error!("Encoding stats for origin server '{}': {}", uid, e);
                    continue;
                }
            };
            match self.cluster.report_retained_stats(&uid, &blob) {
                Ok(()) => reported += 1,
                Err(e) => tracing::warn!("Reporting retained stats for '{}' failed: {}", uid, e),
            }
        }
        reported
    }

    // --- REMOTE SERVERS ---

    /// Returns false when the server already had interest in `topic`.
    pub fn add_remote_server_interest(&self, topic: &str, server: Arc<RemoteServer>) -> Result<bool> {
        let analysis = TopicAnalysis::new(topic)?;
        match self.remote_servers.add_remote_server_interest(&analysis, server) {
            Ok(()) => Ok(true),
            Err(EngineError::ExistingKey) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn remove_remote_server_interest(&self, topic: &str, server: &RemoteServer) -> Result<bool> {
        let analysis = TopicAnalysis::new(topic)?;
        match self.remote_servers.remove_remote_server_interest(&analysis, server) {
            Ok(()) => Ok(true),
            Err(EngineError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn purge_remote_server(&self, server: &RemoteServer) -> usize {
        let removed = self.remote_servers.purge_remote_server(server);
        tracing::info!("Remote server '{}' purged from {} topics", server.uid, removed);
        removed
    }

    pub fn get_remote_server_list(&self, topic: &str) -> Result<ServerSelection> {
        let analysis = TopicAnalysis::new(topic)?;
        self.remote_servers.get_remote_servers(&analysis)
    }

    // --- CLUSTER REQUESTED TOPICS ---

    pub fn activate_cluster_requested_topic(&self, topic: &str) -> Result<()> {
        self.subscriptions.activate_cluster_requested_topic(topic)
    }

    pub fn deactivate_cluster_requested_topic(&self, topic: &str) -> Result<()> {
        self.subscriptions.deactivate_cluster_requested_topic(topic)
    }

    // --- TOPIC MONITORS ---

    pub fn activate_topic_stats(&self, pattern: &str, reset: bool) -> Result<()> {
        self.topics.activate_topic_stats(pattern, reset)
    }

    pub fn deactivate_topic_stats(&self, pattern: &str) -> Result<()> {
        self.topics.deactivate_topic_stats(pattern)
    }

    pub fn topic_stats(&self, pattern: &str) -> Result<TopicStatsSnapshot> {
        self.topics.topic_stats(pattern)
    }

    // --- LIFECYCLE ---

    /// Spawns the periodic maintenance tasks on the current tokio runtime.
    pub fn start_maintenance(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            tracing::debug!("Maintenance already running");
            return;
        }
        tasks.extend(maintenance::spawn_tasks(self));
        tracing::info!("Maintenance started ({} tasks)", tasks.len());
    }

    pub fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        tracing::info!("Topic engine stopped ({} maintenance tasks aborted)", tasks.len());
    }
}
