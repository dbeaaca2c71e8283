//! Retained Message: last value kept for a topic, shared between the tree and readers.

use std::fmt;

use bytes::Bytes;

use crate::utils::UseCount;

pub struct RetainedMessage {
    pub topic: String,
    pub payload: Bytes,
    /// UID of the server that originally published the message.
    pub origin_server: String,
    /// Origin server time (ms). Orders retained messages per origin server.
    pub timestamp: u64,
    pub persistent: bool,
    use_count: UseCount,
}

impl RetainedMessage {
    pub fn new(topic: impl Into<String>, payload: Bytes, origin_server: impl Into<String>, timestamp: u64, persistent: bool) -> Self {
        Self {
            topic: topic.into(),
            payload,
            origin_server: origin_server.into(),
            timestamp,
            persistent,
            use_count: UseCount::default(),
        }
    }

    /// An empty retained publish removes the topic's retained message.
    pub fn is_clear(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn use_count(&self) -> u32 {
        self.use_count.get()
    }

    pub(crate) fn acquire(&self, count: u32) {
        self.use_count.acquire(count);
    }

    pub(crate) fn release(&self, count: u32) {
        self.use_count.release(count);
    }
}

impl fmt::Debug for RetainedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetainedMessage")
            .field("topic", &self.topic)
            .field("origin_server", &self.origin_server)
            .field("timestamp", &self.timestamp)
            .field("payload_len", &self.payload.len())
            .field("persistent", &self.persistent)
            .finish()
    }
}
