//! Origin Server Index: per publishing-server list of retained topic nodes,
//! ordered by retained timestamp (head = oldest, tail = newest).
//!
//! The list threads through the topic nodes themselves; the links are plain
//! node ids and carry no ownership.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::topic_tree::{NodeData, NodeId, Trie};

pub const ORIGIN_SERVER_STATS_VERSION: u32 = 1;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OriginLinks {
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) linked: bool,
}

/// Node payload that can sit on an origin server list.
pub trait OriginEntry {
    fn origin_links(&self) -> &OriginLinks;
    fn origin_links_mut(&mut self) -> &mut OriginLinks;
    fn retained_timestamp(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginServerStats {
    pub version: u32,
    /// Retained messages that would be sent to a remote server (system topics excluded).
    pub count: u32,
    /// Every retained message from this server, system topics included.
    pub local_count: u32,
    pub highest_timestamp_seen: u64,
    pub highest_timestamp_available: u64,
    pub topics_identifier: u64,
}

impl OriginServerStats {
    pub fn new() -> Self {
        Self {
            version: ORIGIN_SERVER_STATS_VERSION,
            ..Self::default()
        }
    }

    pub fn to_blob(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| EngineError::InvalidParameter(e.to_string()))
    }

    /// Decodes a stats blob from any version. Fields the blob lacks are zero,
    /// fields it has beyond ours are ignored.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        let stats: Self = serde_json::from_slice(blob)
            .map_err(|e| EngineError::InvalidParameter(format!("origin server stats: {}", e)))?;
        if stats.version == 0 {
            return Err(EngineError::InvalidParameter("origin server stats without a version".to_string()));
        }
        Ok(stats)
    }
}

/// Which of two stats blobs is more up to date: compares `highest_timestamp_seen` only.
pub fn compare_origin_server_stats(a: &OriginServerStats, b: &OriginServerStats) -> Ordering {
    a.highest_timestamp_seen.cmp(&b.highest_timestamp_seen)
}

#[derive(Debug)]
pub struct OriginServer {
    uid: String,
    local_server: bool,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    last_added: Option<NodeId>,
    stats: OriginServerStats,
}

impl OriginServer {
    pub fn new(uid: &str, local_server: bool) -> Self {
        Self {
            uid: uid.to_string(),
            local_server,
            head: None,
            tail: None,
            last_added: None,
            stats: OriginServerStats::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn is_local(&self) -> bool {
        self.local_server
    }

    pub fn stats(&self) -> &OriginServerStats {
        &self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Links `id` at its timestamp position. The search starts at the last
    /// inserted node (or the tail) and walks whichever way the timestamp points.
    pub fn insert<D: NodeData + OriginEntry>(&mut self, trie: &mut Trie<D>, id: NodeId) {
        let timestamp = trie.data(id).retained_timestamp();
        let system = trie.node(id).is_system_branch();

        if trie.data(id).origin_links().linked {
            tracing::error!("Topic node {:?} already on origin server '{}' list", id, self.uid);
            panic!("topic node already on an origin server list");
        }

        let (prev, next) = match self.last_added.or(self.tail) {
            None => (None, None),
            Some(start) => {
                let ts = |n: NodeId| trie.data(n).retained_timestamp();
                let links = |n: NodeId| *trie.data(n).origin_links();

                if Some(start) == self.tail || ts(start) > timestamp {
                    let mut after = Some(start);
                    while let Some(current) = after {
                        if ts(current) > timestamp {
                            after = links(current).prev;
                        } else {
                            break;
                        }
                    }
                    (after, after.map_or(self.head, |a| links(a).next))
                } else {
                    let mut before = Some(start);
                    while let Some(current) = before {
                        if ts(current) <= timestamp {
                            before = links(current).next;
                        } else {
                            break;
                        }
                    }
                    (before.map_or(self.tail, |b| links(b).prev), before)
                }
            }
        };

        *trie.data_mut(id).origin_links_mut() = OriginLinks { prev, next, linked: true };
        match prev {
            Some(p) => trie.data_mut(p).origin_links_mut().next = Some(id),
            None => self.head = Some(id),
        }
        match next {
            Some(n) => trie.data_mut(n).origin_links_mut().prev = Some(id),
            None => self.tail = Some(id),
        }
        self.last_added = Some(id);

        self.stats.local_count += 1;
        if !system {
            self.stats.count += 1;
            // Only a new tail can raise the highest timestamp seen
            if next.is_none() {
                self.stats.highest_timestamp_seen = self.stats.highest_timestamp_seen.max(timestamp);
            }
            self.stats.highest_timestamp_available = self.latest_available(trie);
        }
    }

    /// Unlinks `id`. Returns false if it was not on a list.
    pub fn remove<D: NodeData + OriginEntry>(&mut self, trie: &mut Trie<D>, id: NodeId) -> bool {
        let links = std::mem::take(trie.data_mut(id).origin_links_mut());
        if !links.linked {
            return false;
        }
        let system = trie.node(id).is_system_branch();

        match links.prev {
            Some(p) => trie.data_mut(p).origin_links_mut().next = links.next,
            None => self.head = links.next,
        }
        match links.next {
            Some(n) => trie.data_mut(n).origin_links_mut().prev = links.prev,
            None => self.tail = links.prev,
        }
        if self.last_added == Some(id) {
            self.last_added = None;
        }

        self.stats.local_count -= 1;
        if !system {
            self.stats.count -= 1;
            self.stats.highest_timestamp_available = self.latest_available(trie);
        }
        true
    }

    // Newest timestamp still on the list, skipping system topics.
    fn latest_available<D: NodeData + OriginEntry>(&self, trie: &Trie<D>) -> u64 {
        let mut current = self.tail;
        while let Some(id) = current {
            if !trie.node(id).is_system_branch() {
                return trie.data(id).retained_timestamp();
            }
            current = trie.data(id).origin_links().prev;
        }
        0
    }

    /// Node ids head to tail.
    pub fn nodes<D: NodeData + OriginEntry>(&self, trie: &Trie<D>) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.stats.local_count as usize);
        let mut current = self.head;
        while let Some(id) = current {
            out.push(id);
            current = trie.data(id).origin_links().next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic_tree::{TopicAnalysis, TreeOp};

    #[derive(Default)]
    struct Entry {
        links: OriginLinks,
        timestamp: u64,
    }

    impl NodeData for Entry {
        fn has_interest(&self) -> bool {
            self.timestamp != 0
        }
    }

    impl OriginEntry for Entry {
        fn origin_links(&self) -> &OriginLinks {
            &self.links
        }
        fn origin_links_mut(&mut self) -> &mut OriginLinks {
            &mut self.links
        }
        fn retained_timestamp(&self) -> u64 {
            self.timestamp
        }
    }

    fn insert(trie: &mut Trie<Entry>, server: &mut OriginServer, topic: &str, timestamp: u64) -> NodeId {
        let id = trie.insert_or_find(&TopicAnalysis::new(topic).unwrap(), TreeOp::Add).unwrap();
        trie.data_mut(id).timestamp = timestamp;
        server.insert(trie, id);
        id
    }

    fn timestamps(trie: &Trie<Entry>, server: &OriginServer) -> Vec<u64> {
        server.nodes(trie).into_iter().map(|id| trie.data(id).timestamp).collect()
    }

    #[test]
    fn test_out_of_order_inserts_stay_sorted() {
        let mut trie = Trie::new();
        let mut server = OriginServer::new("S1", true);

        insert(&mut trie, &mut server, "t/1", 10);
        insert(&mut trie, &mut server, "t/2", 30);
        insert(&mut trie, &mut server, "t/3", 20);
        insert(&mut trie, &mut server, "t/4", 5);
        insert(&mut trie, &mut server, "t/5", 40);
        insert(&mut trie, &mut server, "t/6", 25);

        assert_eq!(timestamps(&trie, &server), vec![5, 10, 20, 25, 30, 40]);
        assert_eq!(server.stats().count, 6);
        assert_eq!(server.stats().highest_timestamp_available, 40);
        assert_eq!(server.stats().highest_timestamp_seen, 40);
    }

    #[test]
    fn test_highest_seen_only_raised_by_new_tail() {
        let mut trie = Trie::new();
        let mut server = OriginServer::new("S1", true);

        insert(&mut trie, &mut server, "a", 10);
        insert(&mut trie, &mut server, "$SYS/late", 30);
        insert(&mut trie, &mut server, "b", 20);

        assert_eq!(timestamps(&trie, &server), vec![10, 20, 30]);
        assert_eq!(server.stats().highest_timestamp_seen, 10, "Inserted before the tail");
        assert_eq!(server.stats().highest_timestamp_available, 20);

        insert(&mut trie, &mut server, "c", 40);
        assert_eq!(server.stats().highest_timestamp_seen, 40);
    }

    #[test]
    fn test_remove_tail_recomputes_available() {
        let mut trie = Trie::new();
        let mut server = OriginServer::new("S1", true);

        insert(&mut trie, &mut server, "a", 10);
        insert(&mut trie, &mut server, "$SYS/a", 15);
        let tail = insert(&mut trie, &mut server, "b", 20);

        assert!(server.remove(&mut trie, tail));
        assert!(!server.remove(&mut trie, tail));
        assert_eq!(timestamps(&trie, &server), vec![10, 15]);
        assert_eq!(server.stats().highest_timestamp_available, 10);
        assert_eq!(server.stats().highest_timestamp_seen, 20);
        assert_eq!(server.stats().count, 1);
        assert_eq!(server.stats().local_count, 2);
    }

    #[test]
    fn test_system_topics_only_count_locally() {
        let mut trie = Trie::new();
        let mut server = OriginServer::new("S1", true);

        insert(&mut trie, &mut server, "$SYS/broker/uptime", 50);
        assert_eq!(server.stats().local_count, 1);
        assert_eq!(server.stats().count, 0);
        assert_eq!(server.stats().highest_timestamp_available, 0);
    }

    #[test]
    fn test_remove_last_empties_list() {
        let mut trie = Trie::new();
        let mut server = OriginServer::new("S1", false);
        let only = insert(&mut trie, &mut server, "x", 1);

        server.remove(&mut trie, only);
        assert!(server.is_empty());
        assert_eq!(server.stats().highest_timestamp_available, 0);

        insert(&mut trie, &mut server, "y", 2);
        assert_eq!(timestamps(&trie, &server), vec![2]);
    }

    #[test]
    fn test_stats_blob_tolerates_versions() {
        let mut stats = OriginServerStats::new();
        stats.count = 3;
        stats.highest_timestamp_seen = 99;
        let decoded = OriginServerStats::from_blob(&stats.to_blob().unwrap()).unwrap();
        assert_eq!(decoded, stats);

        let older = br#"{"version":1,"count":2}"#;
        let decoded = OriginServerStats::from_blob(older).unwrap();
        assert_eq!(decoded.count, 2);
        assert_eq!(decoded.highest_timestamp_available, 0);

        let newer = br#"{"version":2,"count":4,"future_field":7}"#;
        assert_eq!(OriginServerStats::from_blob(newer).unwrap().count, 4);

        assert!(matches!(OriginServerStats::from_blob(b"{}"), Err(EngineError::InvalidParameter(_))));
        assert!(matches!(OriginServerStats::from_blob(b"\x01\x02"), Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn test_compare_uses_highest_timestamp_seen_only() {
        let mut a = OriginServerStats::new();
        let mut b = OriginServerStats::new();
        a.highest_timestamp_seen = 10;
        a.count = 100;
        b.highest_timestamp_seen = 20;

        assert_eq!(compare_origin_server_stats(&a, &b), Ordering::Less);
        assert_eq!(compare_origin_server_stats(&b, &a), Ordering::Greater);
        b.highest_timestamp_seen = 10;
        assert_eq!(compare_origin_server_stats(&a, &b), Ordering::Equal);
    }
}
