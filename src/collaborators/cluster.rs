//! Cluster transport contract. The core only decides what to report.

use crate::error::Result;

pub trait ClusterTransport: Send + Sync {
    fn report_retained_stats(&self, server_uid: &str, stats: &[u8]) -> Result<()>;

    fn add_cluster_subscription_interest(&self, pattern: &str, wildcard: bool) -> Result<()>;

    fn remove_cluster_subscription_interest(&self, pattern: &str, wildcard: bool) -> Result<()>;
}

/// Transport for a standalone (non-clustered) broker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCluster;

impl ClusterTransport for NullCluster {
    fn report_retained_stats(&self, _server_uid: &str, _stats: &[u8]) -> Result<()> {
        Ok(())
    }

    fn add_cluster_subscription_interest(&self, _pattern: &str, _wildcard: bool) -> Result<()> {
        Ok(())
    }

    fn remove_cluster_subscription_interest(&self, _pattern: &str, _wildcard: bool) -> Result<()> {
        Ok(())
    }
}
