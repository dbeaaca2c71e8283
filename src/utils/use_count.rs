use std::sync::atomic::{AtomicU32, Ordering};

/// In-flight use count carried by subscribers, remote servers and retained messages.
/// Lookups acquire before the tree lock is dropped; the caller's release undoes it.
#[derive(Debug, Default)]
pub struct UseCount(AtomicU32);

impl UseCount {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn acquire(&self, count: u32) {
        self.0.fetch_add(count, Ordering::AcqRel);
    }

    /// Returns the remaining count.
    pub fn release(&self, count: u32) -> u32 {
        let previous = self.0.fetch_sub(count, Ordering::AcqRel);
        if previous < count {
            tracing::error!("Use count released below zero ({} - {})", previous, count);
            panic!("use count released below zero");
        }
        previous - count
    }
}
