//! Interfaces the core consumes: persistence and cluster transport.

pub mod cluster;
pub mod store;

pub use cluster::{ClusterTransport, NullCluster};
pub use store::{NullStore, RetainedStore, StoreCall, StoreHandle};
