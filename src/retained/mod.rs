//! Retained messages: the topics tree, origin server index and topic monitors.

pub mod message;
pub mod origin;
pub mod topic_stats;
pub mod topics_tree;

pub use message::RetainedMessage;
pub use origin::{compare_origin_server_stats, OriginServer, OriginServerStats, ORIGIN_SERVER_STATS_VERSION};
pub use topic_stats::{PublishOutcome, TopicStatsSnapshot};
pub use topics_tree::{PendingRetained, PreparedRetained, RetainedBatch, RetainedOptions, RetainedOutcome, RetainedScan, TopicsTree};
