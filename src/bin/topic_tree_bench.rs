use std::sync::Arc;
use std::time::{Duration, Instant};

use topic_engine::collaborators::{NullCluster, NullStore};
use topic_engine::config::Config;
use topic_engine::subscriptions::{ClientId, Subscriber};
use topic_engine::topic_tree::Destination;
use topic_engine::TopicEngine;

fn build_engine() -> TopicEngine {
    TopicEngine::new(&Config::default_for_tests(), Arc::new(NullStore::default()), Arc::new(NullCluster))
}

fn subscribe_all(engine: &TopicEngine, total: usize) -> Duration {
    let start = Instant::now();

    for i in 0..total {
        let pattern = match i % 4 {
            0 => format!("site/{}/sensor/{}", i % 97, i),
            1 => format!("site/+/sensor/{}", i),
            2 => format!("site/{}/#", i % 97),
            _ => format!("fleet/{}/+/status", i % 31),
        };
        let subscriber = Arc::new(Subscriber::new(ClientId(format!("client-{}", i)), format!("sub-{}", i)));
        if let Ok(destination) = Destination::topic(&pattern) {
            let _ = engine.add_subscription(&destination, subscriber);
        }
    }

    start.elapsed()
}

fn lookup_all(engine: &TopicEngine, total: usize) -> (Duration, usize) {
    let start = Instant::now();
    let mut delivered = 0;

    for i in 0..total {
        let topic = format!("site/{}/sensor/{}", i % 97, i % 1_000);
        if let Ok(list) = engine.get_subscriber_list(&topic) {
            delivered += list.subscribers().len();
            let _ = engine.release_subscriber_list(list);
        }
    }

    (start.elapsed(), delivered)
}

fn main() {
    let sizes = [1_000, 10_000, 100_000];

    for &size in &sizes {
        let engine = build_engine();

        let subscribe = subscribe_all(&engine, size);
        let (lookup, delivered) = lookup_all(&engine, size);

        println!(
            "Subscriptions {:>7} → subscribe: {:>8.2?} ({:>6.2} µs/op), lookup: {:>8.2?} ({:>6.2} µs/op), delivered {}",
            size,
            subscribe,
            subscribe.as_secs_f64() * 1_000_000.0 / size as f64,
            lookup,
            lookup.as_secs_f64() * 1_000_000.0 / size as f64,
            delivered
        );
    }
}
