use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::utils::UseCount;

static NEXT_SERVER_KEY: AtomicU64 = AtomicU64::new(1);

/// A cluster peer that has registered interest in some topic patterns.
pub struct RemoteServer {
    /// Process-unique key; remote server lists are kept sorted by it.
    key: u64,
    pub uid: String,
    pub name: String,
    use_count: UseCount,
}

impl RemoteServer {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: NEXT_SERVER_KEY.fetch_add(1, Ordering::Relaxed),
            uid: uid.into(),
            name: name.into(),
            use_count: UseCount::default(),
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn use_count(&self) -> u32 {
        self.use_count.get()
    }

    pub(crate) fn acquire(&self) {
        self.use_count.acquire(1);
    }

    pub(crate) fn release(&self) {
        self.use_count.release(1);
    }
}

impl fmt::Debug for RemoteServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteServer")
            .field("key", &self.key)
            .field("uid", &self.uid)
            .field("name", &self.name)
            .finish()
    }
}
