use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

static LAST_SERVER_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Wall-clock milliseconds since the epoch.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Strictly increasing server timestamp (milliseconds), used to order retained
/// messages published by this server.
pub fn next_server_timestamp() -> u64 {
    let now = now_millis();
    let mut last = LAST_SERVER_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_SERVER_TIMESTAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}
