//! Topic Tree: topic analysis and the generic trie every index is built on.

pub mod analysis;
pub mod node;
pub mod snapshot;
pub mod trie;

pub use analysis::*;
pub use node::{NodeFlags, NodeId, NodeKind};
pub use snapshot::TopicNodeSnapshot;
pub use trie::{dedup_by_identity, NodeData, PrunedSubtree, Trie, TreeOp};
