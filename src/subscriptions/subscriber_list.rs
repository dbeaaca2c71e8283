use std::sync::Arc;

use crate::error::Result;
use crate::remote::ServerSelection;
use crate::retained::PreparedRetained;
use crate::subscriptions::subscriber::Subscriber;

/// The delivery set for one publish. Holds a use count on every subscriber
/// (and remote server) until dropped or released.
pub struct SubscriberList {
    topic: String,
    publish_suv: u64,
    subscribers: Vec<Arc<Subscriber>>,
    remote_servers: Option<ServerSelection>,
    retained: Option<PreparedRetained>,
}

impl SubscriberList {
    pub(crate) fn new(topic: &str, publish_suv: u64, subscribers: Vec<Arc<Subscriber>>, remote_servers: Option<ServerSelection>) -> Self {
        Self {
            topic: topic.to_string(),
            publish_suv,
            subscribers,
            remote_servers,
            retained: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publish_suv(&self) -> u64 {
        self.publish_suv
    }

    /// True once the subscription tree has changed since this list was computed.
    pub fn is_stale(&self, current_suv: u64) -> bool {
        self.publish_suv != current_suv
    }

    pub fn subscribers(&self) -> &[Arc<Subscriber>] {
        &self.subscribers
    }

    pub fn remote_servers(&self) -> Option<&ServerSelection> {
        self.remote_servers.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty() && self.remote_servers.as_ref().map_or(true, |s| s.is_empty())
    }

    pub fn retained(&self) -> Option<&PreparedRetained> {
        self.retained.as_ref()
    }

    pub(crate) fn attach_retained(&mut self, prepared: PreparedRetained) {
        self.retained = Some(prepared);
    }

    /// Releases the use counts and promotes the attached retained update, if any.
    /// Returns whether a retained message was promoted.
    pub(crate) fn release(mut self) -> Result<bool> {
        match self.retained.take() {
            Some(prepared) => prepared.commit(),
            None => Ok(false),
        }
    }
}

impl Drop for SubscriberList {
    fn drop(&mut self) {
        for subscriber in &self.subscribers {
            subscriber.release();
        }
    }
}
