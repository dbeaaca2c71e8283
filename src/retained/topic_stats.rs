//! Topic Stats: publish counters kept on monitored topic nodes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::utils::utils_time::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    NoSubscribers,
    Failed,
}

/// Counters are bumped under the tree's read lock, hence atomics.
#[derive(Debug)]
pub struct TopicStats {
    published: AtomicU64,
    no_subscribers: AtomicU64,
    failed: AtomicU64,
    reset_time: AtomicU64,
}

impl Default for TopicStats {
    fn default() -> Self {
        Self {
            published: AtomicU64::new(0),
            no_subscribers: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            reset_time: AtomicU64::new(now_millis()),
        }
    }
}

impl TopicStats {
    pub(crate) fn record(&self, outcome: PublishOutcome) {
        let counter = match outcome {
            PublishOutcome::Delivered => &self.published,
            PublishOutcome::NoSubscribers => &self.no_subscribers,
            PublishOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.published.store(0, Ordering::Relaxed);
        self.no_subscribers.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.reset_time.store(now_millis(), Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, pattern: String) -> TopicStatsSnapshot {
        TopicStatsSnapshot {
            pattern,
            published: self.published.load(Ordering::Relaxed),
            no_subscribers: self.no_subscribers.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            reset_time: self.reset_time.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicStatsSnapshot {
    pub pattern: String,
    pub published: u64,
    pub no_subscribers: u64,
    pub failed: u64,
    pub reset_time: u64,
}
