//! Subscriber: a local subscription's delivery endpoint as seen by the trees.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::utils::UseCount;

// ClientId represents a connected client
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

pub struct Subscriber {
    pub client: ClientId,
    pub name: String,
    /// Interest in this subscription is advertised to the cluster.
    pub share_with_cluster: bool,
    use_count: UseCount,
    // Tree nodes (and regex entries) this subscriber is attached to
    attachments: AtomicU32,
}

impl Subscriber {
    pub fn new(client: ClientId, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            share_with_cluster: false,
            use_count: UseCount::default(),
            attachments: AtomicU32::new(0),
        }
    }

    pub fn shared_with_cluster(mut self) -> Self {
        self.share_with_cluster = true;
        self
    }

    /// Subscriber lists currently holding this subscriber.
    pub fn use_count(&self) -> u32 {
        self.use_count.get()
    }

    pub fn attachments(&self) -> u32 {
        self.attachments.load(Ordering::Acquire)
    }

    pub(crate) fn acquire(&self) {
        self.use_count.acquire(1);
    }

    pub(crate) fn release(&self) {
        self.use_count.release(1);
    }

    /// Returns the attachment count after the change.
    pub(crate) fn attach(&self) -> u32 {
        self.attachments.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn detach(&self) -> u32 {
        self.attachments.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("client", &self.client)
            .field("name", &self.name)
            .field("share_with_cluster", &self.share_with_cluster)
            .field("use_count", &self.use_count())
            .finish()
    }
}
