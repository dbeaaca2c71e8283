//! Periodic retained-message maintenance: the min-active-order-id scan and the
//! origin server stats report.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::TopicEngine;

pub(crate) fn spawn_tasks(engine: &TopicEngine) -> Vec<JoinHandle<()>> {
    let config = &engine.config().maintenance;
    vec![
        spawn_retained_scan(engine.clone(), Duration::from_millis(config.retained_scan_interval_ms)),
        spawn_stats_report(engine.clone(), Duration::from_millis(config.retained_stats_interval_ms)),
    ]
}

fn spawn_retained_scan(engine: TopicEngine, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let scan = engine.topics().scan_for_min_active_order_id(true).await;
            tracing::debug!(
                "Retained scan: {} active, order ids {}..{}",
                scan.active_count,
                scan.min_active_order_id,
                scan.max_active_order_id
            );
        }
    })
}

fn spawn_stats_report(engine: TopicEngine, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;
        loop {
            interval.tick().await;
            engine.report_retained_stats();
        }
    })
}
