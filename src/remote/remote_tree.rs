//! Remote-Server Tree: which cluster members want publishes on which patterns.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{EngineError, Result};
use crate::remote::remote_server::RemoteServer;
use crate::remote::server_list::RemoteServerList;
use crate::topic_tree::{dedup_by_identity, NodeData, NodeId, TopicAnalysis, TopicNodeSnapshot, TreeOp, Trie};

#[derive(Default)]
pub struct RemoteNodeData {
    // None once the last server leaves
    servers: Option<RemoteServerList>,
}

impl NodeData for RemoteNodeData {
    fn has_interest(&self) -> bool {
        self.servers.is_some()
    }
}

/// Remote servers matched by one lookup, sorted by key. Dropping the selection
/// releases the use counts the lookup took.
#[derive(Debug, Default)]
pub struct ServerSelection {
    servers: Vec<Arc<RemoteServer>>,
}

impl ServerSelection {
    pub fn servers(&self) -> &[Arc<RemoteServer>] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RemoteServer>> {
        self.servers.iter()
    }
}

impl Drop for ServerSelection {
    fn drop(&mut self) {
        for server in &self.servers {
            server.release();
        }
    }
}

pub struct RemoteServerTree {
    trie: RwLock<Trie<RemoteNodeData>>,
}

impl Default for RemoteServerTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteServerTree {
    pub fn new() -> Self {
        Self {
            trie: RwLock::new(Trie::new()),
        }
    }

    pub fn add_remote_server_interest(&self, topic: &TopicAnalysis, server: Arc<RemoteServer>) -> Result<()> {
        let mut trie = self.trie.write();
        let node = trie.insert_or_find(topic, TreeOp::Add)?;

        let list = trie.data_mut(node).servers.get_or_insert_with(RemoteServerList::default);
        let added = list.insert(server);
        if added.is_ok() {
            trie.note_interest_added(node);
            return Ok(());
        }

        // Nothing was attached; undo an empty list and any nodes created for it
        if trie.data(node).servers.as_ref().is_some_and(|l| l.is_empty()) {
            trie.data_mut(node).servers = None;
        }
        let pruned = trie.remove_unused_tree(node);
        drop(trie);
        drop(pruned);
        added
    }

    pub fn remove_remote_server_interest(&self, topic: &TopicAnalysis, server: &RemoteServer) -> Result<()> {
        let mut trie = self.trie.write();
        let node = trie.insert_or_find(topic, TreeOp::Find)?;

        let removed = Self::detach_server(&mut trie, node, server)?;
        let pruned = trie.remove_unused_tree(node);
        drop(trie);
        drop(pruned);
        drop(removed);
        Ok(())
    }

    fn detach_server(trie: &mut Trie<RemoteNodeData>, node: NodeId, server: &RemoteServer) -> Result<Arc<RemoteServer>> {
        let data = trie.data_mut(node);
        let list = data.servers.as_mut().ok_or(EngineError::NotFound)?;
        let removed = list.remove(server)?;
        if list.is_empty() {
            data.servers = None;
        }
        trie.note_interest_removed(node);
        Ok(removed)
    }

    /// Removes `server` from every node. Returns how many nodes held it.
    pub fn purge_remote_server(&self, server: &RemoteServer) -> usize {
        let mut trie = self.trie.write();

        let mut candidates = Vec::new();
        let mut removed = Vec::new();
        for node in trie.live_nodes() {
            let holds = trie.data(node).servers.as_ref().is_some_and(|l| l.contains(server));
            if !holds {
                continue;
            }
            if let Ok(server) = Self::detach_server(&mut trie, node, server) {
                removed.push(server);
                candidates.push(node);
            }
        }

        // Deepest first; an earlier prune may already have taken a candidate out
        let mut pruned = Vec::new();
        for node in candidates.into_iter().rev() {
            if trie.contains(node) {
                pruned.extend(trie.remove_unused_tree(node));
            }
        }
        drop(trie);

        tracing::debug!(
            "Purged remote server '{}' from {} nodes ({} subtrees pruned)",
            server.uid,
            removed.len(),
            pruned.len()
        );
        drop(pruned);
        removed.len()
    }

    /// The servers of every node matching `topic`, each once, use counts raised.
    pub fn get_remote_servers(&self, topic: &TopicAnalysis) -> Result<ServerSelection> {
        let trie = self.trie.read();

        let mut nodes = Vec::new();
        trie.find_matching(topic, |data| data.servers.is_some(), &mut nodes);

        let mut servers: Vec<Arc<RemoteServer>> = nodes
            .iter()
            .filter_map(|id| trie.data(*id).servers.as_ref())
            .flat_map(|list| list.servers().iter().cloned())
            .collect();
        if nodes.len() > 1 {
            servers.sort_by_key(|s| s.key());
            dedup_by_identity(&mut servers, |s| s.key());
        }

        if servers.is_empty() {
            return Err(EngineError::NotFound);
        }
        for server in &servers {
            server.acquire();
        }
        Ok(ServerSelection { servers })
    }

    pub fn node_count(&self) -> usize {
        self.trie.read().len()
    }

    pub fn snapshot(&self) -> TopicNodeSnapshot {
        self.trie.read().snapshot(|data| data.servers.as_ref().map_or(0, |l| l.len()))
    }
}
