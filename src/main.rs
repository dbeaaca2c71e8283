use std::sync::Arc;

use topic_engine::collaborators::{NullCluster, NullStore};
use topic_engine::config::Config;
use topic_engine::TopicEngine;
use tracing_subscriber::EnvFilter;

// ========================================
// MAIN ENTRY POINT
// ========================================

#[tokio::main]
async fn main() {
    let config = Config::global();

    let filter = EnvFilter::try_new(&config.engine.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine = TopicEngine::new(config, Arc::new(NullStore::default()), Arc::new(NullCluster));
    engine.start_maintenance();

    tracing::info!("Topic engine ready (standalone, no persistence)");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Waiting for Ctrl-C failed: {}", e);
    }

    engine.shutdown();
}
