use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TopicNodeSnapshot {
    pub name: String, // "kitchen", "+", "#"
    pub flags: u32,
    /// Subscribers, servers or retained messages held by this node.
    pub interest: usize,
    pub children: Vec<TopicNodeSnapshot>,
}

impl TopicNodeSnapshot {
    /// Depth-first search for a node by its path below this one.
    pub fn find(&self, topic: &str) -> Option<&TopicNodeSnapshot> {
        let mut current = self;
        for part in topic.split('/') {
            current = current.children.iter().find(|child| child.name == part)?;
        }
        Some(current)
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TopicNodeSnapshot::node_count).sum::<usize>()
    }
}
